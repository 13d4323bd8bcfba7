//! Validators for the names that appear in an interface description,
//! and derivation of target-language symbols from D-Bus names.

fn is_az_(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_')
}

fn is_az09_(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_')
}

/// A member name: `[A-Za-z_][A-Za-z0-9_]*`, 1..=255 bytes, no dots.
pub fn is_valid_member_name(s: &str) -> bool {
    let s = s.as_bytes();
    if s.is_empty() || s.len() > 255 {
        return false;
    }
    is_az_(s[0]) && s[1..].iter().all(|&b| is_az09_(b))
}

/// An interface name: two or more member-name elements joined by '.',
/// at most 255 bytes overall.
pub fn is_valid_interface_name(s: &str) -> bool {
    if s.len() > 255 {
        return false;
    }
    let mut elements = 0;
    for e in s.split('.') {
        let e = e.as_bytes();
        match e.first() {
            Some(&b) if is_az_(b) => (),
            _ => return false,
        }
        if !e[1..].iter().all(|&b| is_az09_(b)) {
            return false;
        }
        elements += 1;
    }
    elements >= 2
}

/// A symbol override: same rule as a member name.
pub fn is_valid_symbol(s: &str) -> bool {
    is_valid_member_name(s)
}

const C_KEYWORDS: [&str; 37] = [
    "auto", "break", "case", "char", "const", "continue", "default", "do",
    "double", "else", "enum", "extern", "float", "for", "goto", "if",
    "inline", "int", "long", "register", "restrict", "return", "short",
    "signed", "sizeof", "static", "struct", "switch", "typedef", "union",
    "unsigned", "void", "volatile", "while", "_Bool", "_Complex",
    "_Imaginary",
];

/// Converts a CamelCase D-Bus name to lowercase-with-underscores.
///
/// Dots and any other separator characters start a new word, so this
/// also turns "com.example.Test" into "com_example_test".
pub fn make_snake(s: &str) -> String {
    let mut lcase = false;
    let mut r = String::new();
    for c in s.chars() {
        match c {
            'a'..='z' | '0'..='9' => {
                r.push(c);
                lcase = true;
            }
            'A'..='Z' => {
                if lcase {
                    r.push('_');
                }
                lcase = false;
                r.push(c.to_ascii_lowercase());
            }
            _ => {
                if lcase {
                    r.push('_');
                }
                lcase = false;
            }
        }
    }
    r
}

/// Like [`make_snake`], with a trailing underscore when the result
/// would be a C keyword. Used for variable names only; function names
/// are always prefixed and cannot collide.
pub fn make_varname(s: &str) -> String {
    let mut r = make_snake(s);
    if C_KEYWORDS.iter().any(|k| *k == r) {
        r.push('_');
    }
    r
}

/// Converts a name to CamelCase, treating any non-alphanumeric
/// character as a word separator.
pub fn make_camel(s: &str) -> String {
    let mut ucase = true;
    s.chars()
        .filter_map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => {
                let cc = if ucase { c.to_ascii_uppercase() } else { c };
                ucase = false;
                Some(cc)
            }
            _ => {
                ucase = true;
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member() {
        assert!(!is_valid_member_name(""));
        assert!(is_valid_member_name("He11o"));
        assert!(is_valid_member_name("_"));
        assert!(!is_valid_member_name("He11o!"));
        assert!(!is_valid_member_name("1Hello"));
        assert!(!is_valid_member_name("Hello.World"));
        assert!(is_valid_member_name(&"x".repeat(255)));
        assert!(!is_valid_member_name(&"x".repeat(256)));
    }

    #[test]
    fn interface() {
        assert!(!is_valid_interface_name(""));
        assert!(!is_valid_interface_name("He11o"));
        assert!(!is_valid_interface_name("Hello."));
        assert!(!is_valid_interface_name("Hello!.World"));
        assert!(!is_valid_interface_name("ZZZ.1Hello"));
        assert!(is_valid_interface_name("Hello.W0rld"));
        assert!(is_valid_interface_name("com.example.T"));
        assert!(!is_valid_interface_name(":1.54"));
    }

    #[test]
    fn snake() {
        assert_eq!(make_snake("TestFoo"), "test_foo");
        assert_eq!(make_snake("test_foo"), "test_foo");
        assert_eq!(make_snake("GetConnectionUnixProcessID"), "get_connection_unix_process_id");
        assert_eq!(make_snake("com.example.T"), "com_example_t");
    }

    #[test]
    fn varname_keywords() {
        assert_eq!(make_varname("Interface"), "interface");
        assert_eq!(make_varname("Switch"), "switch_");
        assert_eq!(make_varname("Default"), "default_");
    }

    #[test]
    fn camel() {
        assert_eq!(make_camel("com.example.T"), "ComExampleT");
        assert_eq!(make_camel("test_foo"), "TestFoo");
        assert_eq!(make_camel("Do"), "Do");
    }
}
