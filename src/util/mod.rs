pub mod tags;

/// Turn an iteration path into something usable as a file name.
pub fn sanitize_file_stem(path: &str) -> String {
    path.chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
