/// Lines of an M3U body that reference mp3 resources, in order.
///
/// Lines are trimmed first, so CRLF bodies work. `#` lines are M3U
/// directives and never count as entries.
pub fn mp3_entries(body: &str) -> Vec<&str> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter(|line| line.ends_with(".mp3"))
        .collect()
}
