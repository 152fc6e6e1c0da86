/// Byte offset and length of a 1-based line in `source`, excluding its line
/// terminator. Lines past the end map to an empty span at the end of input.
pub fn line_span(source: &str, line: usize) -> (usize, usize) {
    let mut offset = 0;
    for (i, text) in source.split('\n').enumerate() {
        if i + 1 == line {
            return (offset, text.trim_end_matches('\r').len());
        }
        offset += text.len() + 1;
    }
    (source.len(), 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_span() {
        let src = "<A>\n    x: 1\r\n\n    y: 2";
        assert_eq!(line_span(src, 1), (0, 3));
        assert_eq!(line_span(src, 2), (4, 8));
        assert_eq!(line_span(src, 3), (14, 0));
        assert_eq!(line_span(src, 4), (15, 8));
        assert_eq!(line_span(src, 9), (src.len(), 0));
    }
}
