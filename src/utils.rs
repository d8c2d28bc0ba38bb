//! Small helpers shared by factories and the session reader.

/// File name handling
pub mod media {
    use std::path::Path;

    /// Session file extension
    pub const SESSION_EXT: &str = "mix";

    pub const VIDEO_EXTS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "mpg", "ogv"];

    fn has_ext(path: &Path, exts: &[&str]) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|s| exts.contains(&s.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    pub fn is_video(path: &Path) -> bool {
        has_ext(path, VIDEO_EXTS)
    }

    pub fn is_session(path: &Path) -> bool {
        has_ext(path, &[SESSION_EXT])
    }

    /// File name without directory nor extension.
    pub fn base_filename(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Name normalization
pub mod text {
    /// Map a name onto printable ASCII.
    ///
    /// Accented latin letters lose their accent, a few ligatures expand,
    /// anything else outside ASCII becomes `_`. No character is dropped.
    pub fn transliterate(input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        for c in input.chars() {
            if c.is_ascii() {
                if c.is_ascii_control() {
                    out.push(' ');
                } else {
                    out.push(c);
                }
                continue;
            }
            match fold(c) {
                Some(s) => out.push_str(s),
                None => out.push('_'),
            }
        }
        out
    }

    fn fold(c: char) -> Option<&'static str> {
        Some(match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "A",
            'ç' | 'ć' | 'č' => "c",
            'Ç' | 'Ć' | 'Č' => "C",
            'ď' | 'đ' => "d",
            'Ď' | 'Đ' => "D",
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
            'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ę' | 'Ě' => "E",
            'ì' | 'í' | 'î' | 'ï' | 'ī' => "i",
            'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' => "I",
            'ł' => "l",
            'Ł' => "L",
            'ñ' | 'ń' | 'ň' => "n",
            'Ñ' | 'Ń' | 'Ň' => "N",
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => "O",
            'ř' => "r",
            'Ř' => "R",
            'ś' | 'š' | 'ş' => "s",
            'Ś' | 'Š' | 'Ş' => "S",
            'ť' | 'ţ' => "t",
            'Ť' | 'Ţ' => "T",
            'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
            'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' => "U",
            'ý' | 'ÿ' => "y",
            'Ý' | 'Ÿ' => "Y",
            'ź' | 'ż' | 'ž' => "z",
            'Ź' | 'Ż' | 'Ž' => "Z",
            'æ' => "ae",
            'Æ' => "AE",
            'œ' => "oe",
            'Œ' => "OE",
            'ß' => "ss",
            _ => return None,
        })
    }

    /// Leading token before the first whitespace.
    pub fn first_word(input: &str) -> &str {
        input.split_whitespace().next().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::media::*;
    use super::text::*;
    use std::path::Path;

    #[test]
    fn test_base_filename() {
        assert_eq!(base_filename(Path::new("/videos/clip.mp4")), "clip");
        assert_eq!(base_filename(Path::new("show.v2.mix")), "show.v2");
        assert_eq!(base_filename(Path::new("")), "");
    }

    #[test]
    fn test_extensions() {
        assert!(is_session(Path::new("a/b.MIX")));
        assert!(!is_session(Path::new("a/b.mp4")));
        assert!(is_video(Path::new("a/b.Mov")));
    }

    #[test]
    fn test_transliterate() {
        assert_eq!(transliterate("Café déjà vu"), "Cafe deja vu");
        assert_eq!(transliterate("Straße"), "Strasse");
        assert_eq!(transliterate("雪"), "_");
        assert_eq!(transliterate("plain"), "plain");
    }

    #[test]
    fn test_first_word() {
        assert_eq!(first_word("videotestsrc pattern=ball"), "videotestsrc");
        assert_eq!(first_word("   "), "");
    }
}
