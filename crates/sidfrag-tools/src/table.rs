use unicode_width::UnicodeWidthStr;

/// Pad a &str to a target display width (columns) using unicode-width so
/// fullwidth characters in SID credits line up. Pads with spaces on the
/// right for left-aligned terminal output.
pub fn pad_to_width(s: &str, width: usize) -> String {
    let w = UnicodeWidthStr::width(s);
    if w >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - w))
    }
}

/// Render a waveform mask like `t-p-` from the four waveform flags.
pub fn waveform_mask(tri: bool, saw: bool, pulse: bool, noise: bool) -> String {
    let mut mask = String::with_capacity(4);
    mask.push(if tri { 't' } else { '-' });
    mask.push(if saw { 's' } else { '-' });
    mask.push(if pulse { 'p' } else { '-' });
    mask.push(if noise { 'n' } else { '-' });
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_to_width() {
        assert_eq!(pad_to_width("ab", 4), "ab  ");
        assert_eq!(pad_to_width("abcd", 2), "abcd");
    }

    #[test]
    fn test_waveform_mask() {
        assert_eq!(waveform_mask(true, false, true, false), "t-p-");
        assert_eq!(waveform_mask(false, false, false, true), "---n");
    }
}
