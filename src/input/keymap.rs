//! Web key name to X11 keysym mapping

use once_cell::sync::Lazy;
use regex::Regex;

/// Character class accepted for pass-through key names
static VALID_KEY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("valid key name pattern"));

/// Translate a browser `KeyboardEvent.key` value into the keysym handed
/// to the injection tool.
///
/// Dictionary entries win; anything else passes through when it is either
/// a single printable ASCII character or matches the permitted name class.
/// Everything else is dropped.
pub fn map_key(key: &str) -> Option<&str> {
    if let Some(keysym) = keysym_for(key) {
        return Some(keysym);
    }
    let printable_single =
        key.len() == 1 && matches!(key.as_bytes()[0], 0x20..=0x7e);
    if printable_single || VALID_KEY_NAME.is_match(key) {
        Some(key)
    } else {
        None
    }
}

/// Dictionary of web key names whose keysym differs from the name itself
/// (plus a few identity entries kept for clarity).
fn keysym_for(key: &str) -> Option<&'static str> {
    let keysym = match key {
        "Control" => "Control_L",
        "Shift" => "Shift_L",
        "Alt" => "Alt_L",
        "Meta" => "Super_L",
        "Enter" => "Return",
        "Backspace" => "BackSpace",
        "ArrowUp" => "Up",
        "ArrowDown" => "Down",
        "ArrowLeft" => "Left",
        "ArrowRight" => "Right",
        "Escape" => "Escape",
        "Tab" => "Tab",
        "Home" => "Home",
        "End" => "End",
        "PageUp" => "Page_Up",
        "PageDown" => "Page_Down",
        "Delete" => "Delete",
        "Insert" => "Insert",
        " " => "space",
        "!" => "exclam",
        "\"" => "quotedbl",
        "#" => "numbersign",
        "$" => "dollar",
        "%" => "percent",
        "&" => "ampersand",
        "'" => "apostrophe",
        "(" => "parenleft",
        ")" => "parenright",
        "*" => "asterisk",
        "+" => "plus",
        "," => "comma",
        "-" => "minus",
        "." => "period",
        "/" => "slash",
        ":" => "colon",
        ";" => "semicolon",
        "<" => "less",
        "=" => "equal",
        ">" => "greater",
        "?" => "question",
        "@" => "at",
        "[" => "bracketleft",
        "\\" => "backslash",
        "]" => "bracketright",
        "^" => "asciicircum",
        "_" => "underscore",
        "`" => "grave",
        "{" => "braceleft",
        "|" => "bar",
        "}" => "braceright",
        "~" => "asciitilde",
        _ => return None,
    };
    Some(keysym)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_keys_use_the_dictionary() {
        assert_eq!(map_key("Enter"), Some("Return"));
        assert_eq!(map_key("ArrowUp"), Some("Up"));
        assert_eq!(map_key("Meta"), Some("Super_L"));
        assert_eq!(map_key(" "), Some("space"));
        assert_eq!(map_key("#"), Some("numbersign"));
    }

    #[test]
    fn printable_ascii_passes_through() {
        assert_eq!(map_key("a"), Some("a"));
        assert_eq!(map_key("Z"), Some("Z"));
        assert_eq!(map_key("7"), Some("7"));
    }

    #[test]
    fn function_keys_pass_the_name_class() {
        assert_eq!(map_key("F1"), Some("F1"));
        assert_eq!(map_key("F12"), Some("F12"));
    }

    #[test]
    fn unknown_names_are_dropped() {
        assert_eq!(map_key("Enter; rm -rf /"), None);
        assert_eq!(map_key("two words"), None);
        assert_eq!(map_key(""), None);
        assert_eq!(map_key("\u{1F600}"), None);
    }
}
