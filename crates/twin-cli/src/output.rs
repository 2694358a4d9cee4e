use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(String::len)
                .fold(h.len(), usize::max)
        })
        .collect();

    let line = |cells: Vec<String>| cells.join("  ").trim_end().to_string();
    let pad = |i: usize, s: &str| format!("{s:w$}", w = widths.get(i).copied().unwrap_or(0));

    println!(
        "{}",
        line(headers.iter().enumerate().map(|(i, h)| pad(i, h)).collect())
    );
    println!("{}", line(widths.iter().map(|&w| "-".repeat(w)).collect()));
    for row in rows {
        println!(
            "{}",
            line(row.iter().enumerate().map(|(i, c)| pad(i, c)).collect())
        );
    }
}
