/// Decode backslash escapes left in calendar descriptions (`\n`, `\u00e9`, ...).
///
/// Works on chars, so text that is already multi-byte passes through untouched.
/// Unknown or malformed escapes are kept as written.
pub fn decode_escapes(input: &str) -> String {
    if !input.contains('\\') {
        return input.to_string();
    }

    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let simple = match chars[i + 1] {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            '\\' => Some('\\'),
            '\'' => Some('\''),
            '"' => Some('"'),
            _ => None,
        };
        if let Some(c) = simple {
            out.push(c);
            i += 2;
            continue;
        }

        let width = match chars[i + 1] {
            'x' => 2,
            'u' => 4,
            'U' => 8,
            _ => 0,
        };
        match hex_at(&chars, i + 2, width) {
            Some(cp) if (0xD800..0xDC00).contains(&cp) && width == 4 => {
                // High surrogate: only meaningful with a following \uDC00-\uDFFF
                let low = (chars.get(i + 6) == Some(&'\\') && chars.get(i + 7) == Some(&'u'))
                    .then(|| hex_at(&chars, i + 8, 4))
                    .flatten()
                    .filter(|lo| (0xDC00..0xE000).contains(lo));
                match low.and_then(|lo| char::from_u32(0x10000 + ((cp - 0xD800) << 10) + (lo - 0xDC00))) {
                    Some(c) => {
                        out.push(c);
                        i += 12;
                    }
                    None => {
                        out.push('\\');
                        i += 1;
                    }
                }
            }
            Some(cp) => match char::from_u32(cp) {
                Some(c) => {
                    out.push(c);
                    i += 2 + width;
                }
                None => {
                    out.push('\\');
                    i += 1;
                }
            },
            None => {
                out.push('\\');
                i += 1;
            }
        }
    }

    out
}

fn hex_at(chars: &[char], start: usize, width: usize) -> Option<u32> {
    if width == 0 || start + width > chars.len() {
        return None;
    }
    let digits = &chars[start..start + width];
    if !digits.iter().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(&digits.iter().collect::<String>(), 16).ok()
}
