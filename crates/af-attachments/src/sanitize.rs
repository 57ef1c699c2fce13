//! Filename sanitizing and thumbnail naming

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest allowed name before the extension
pub const MAX_BASENAME_LEN: usize = 70;

/// Longest allowed name before the extension when it carries a `_thumb` suffix
pub const MAX_THUMB_BASENAME_LEN: usize = 82;

static DIRECTORY_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"^.*(\\|/)").unwrap());
static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9.\-]").unwrap());
static UNDERSCORE_DOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"_\.").unwrap());
static UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").unwrap());
static EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\w+$").unwrap());

/// Sanitize an uploaded filename.
///
/// Directory components are dropped, anything outside `[A-Za-z0-9.-]`
/// becomes `_`, underscore runs collapse and the result is lowercased.
/// The part before the extension is capped at 70 characters (82 when it
/// contains `_thumb`).
pub fn sanitize_filename(raw: Option<&str>) -> Option<String> {
    let name = raw?.trim();

    let name = DIRECTORY_PART.replace(name, "");
    let name = DISALLOWED.replace_all(&name, "_");
    let name = UNDERSCORE_DOT.replace_all(&name, ".");
    let name = UNDERSCORES.replace_all(&name, "_");
    let name = name.to_ascii_lowercase();

    let (base, ext) = match name.rsplit_once('.') {
        Some((base, ext)) => (base, Some(ext)),
        None => (name.as_str(), None),
    };

    let limit = if base.contains("_thumb") {
        MAX_THUMB_BASENAME_LEN
    } else {
        MAX_BASENAME_LEN
    };
    // Only ASCII survives the replacement above, so byte slicing is safe.
    let base = &base[..base.len().min(limit)];

    Some(match ext {
        Some(ext) => format!("{}.{}", base, ext),
        None => base.to_string(),
    })
}

/// Split `filename` into its base and trailing `.ext` (empty when absent)
pub fn split_extension(filename: &str) -> (&str, &str) {
    match EXTENSION.find(filename) {
        Some(m) => (&filename[..m.start()], m.as_str()),
        None => (filename, ""),
    }
}

/// Derive a thumbnail filename: `foo.jpg` with suffix `thumb` becomes `foo_thumb.jpg`.
///
/// `map_extension` lets the active image processor swap the extension when
/// it cannot write the source format.
pub fn thumbnail_name_for<F>(filename: &str, suffix: Option<&str>, map_extension: F) -> String
where
    F: FnOnce(&str) -> String,
{
    let suffix = match suffix {
        Some(s) if !s.trim().is_empty() => s,
        _ => return filename.to_string(),
    };

    let (base, ext) = split_extension(filename);
    let ext = if ext.is_empty() {
        String::new()
    } else {
        map_extension(ext)
    };
    format!("{}_{}{}", base, suffix, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(raw: &str) -> String {
        sanitize_filename(Some(raw)).unwrap()
    }

    #[test]
    fn test_none_stays_none() {
        assert_eq!(sanitize_filename(None), None);
    }

    #[test]
    fn test_strips_directories() {
        assert_eq!(sanitize("../../etc/passwd.JPG"), "passwd.jpg");
        assert_eq!(sanitize(r"C:\Documents and Settings\me\photo.png"), "photo.png");
        assert_eq!(sanitize("  /tmp/upload.gif  "), "upload.gif");
    }

    #[test]
    fn test_replaces_disallowed_characters() {
        assert_eq!(sanitize("my summer (2019).jpeg"), "my_summer_2019.jpeg");
        assert_eq!(sanitize("a___b.png"), "a_b.png");
        assert_eq!(sanitize("ünïcode-name.PNG"), "_n_code-name.png");
        assert_eq!(sanitize("trailing .txt"), "trailing.txt");
    }

    #[test]
    fn test_output_alphabet() {
        let inputs = [
            "../weird/\\path\\Name With Spaces!.JPG",
            "<script>alert(1)</script>.html",
            "tab\tand\nnewline.Txt",
            "emoji 😀 file.gif",
        ];
        for input in inputs {
            let out = sanitize(input);
            assert!(!out.contains('/') && !out.contains('\\'), "{}", out);
            assert!(
                out.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c)),
                "{}",
                out
            );
        }
        assert!(sanitize("Name.JPG").ends_with(".jpg"));
    }

    #[test]
    fn test_truncates_basename() {
        let long = format!("{}.jpg", "a".repeat(100));
        assert_eq!(sanitize(&long), format!("{}.jpg", "a".repeat(70)));

        let thumb = format!("{}_thumb.jpg", "b".repeat(90));
        let out = sanitize(&thumb);
        assert_eq!(out, format!("{}.jpg", &format!("{}_thumb", "b".repeat(90))[..82]));

        let no_ext = "c".repeat(75);
        assert_eq!(sanitize(&no_ext).len(), 70);
    }

    #[test]
    fn test_thumbnail_name_for() {
        let keep = |ext: &str| ext.to_string();
        assert_eq!(thumbnail_name_for("rails.png", Some("thumb"), keep), "rails_thumb.png");
        assert_eq!(thumbnail_name_for("rails.png", None, keep), "rails.png");
        assert_eq!(thumbnail_name_for("rails.png", Some(""), keep), "rails.png");
        assert_eq!(thumbnail_name_for("noext", Some("small"), keep), "noext_small");
        assert_eq!(
            thumbnail_name_for("archive.tar.gz", Some("x"), keep),
            "archive.tar_x.gz"
        );
    }

    #[test]
    fn test_thumbnail_name_extension_mapping() {
        let gif_to_png = |ext: &str| {
            if ext.eq_ignore_ascii_case(".gif") {
                ".png".to_string()
            } else {
                ext.to_string()
            }
        };
        assert_eq!(
            thumbnail_name_for("anim.gif", Some("thumb"), gif_to_png),
            "anim_thumb.png"
        );
    }
}
