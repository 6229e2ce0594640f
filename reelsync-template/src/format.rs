//! `{placeholder}` substitution.
//!
//! Grammar (a subset of the usual brace-format mini-language):
//!
//! ```text
//! replacement := "{" name [":" spec] "}"
//! spec        := [[fill] align] [sign] ["0"] [width] ["." precision] [type]
//! align       := "<" | ">" | "^" | "="
//! sign        := "+" | "-" | " "
//! type        := "d" | "s" | "f" | "x" | "X" | "o" | "b"
//! ```
//!
//! `{{` and `}}` are literal braces. A placeholder whose name is not in the
//! context, or whose spec cannot be applied to the value, is copied to the
//! output unchanged. Rendering never fails.

use serde_json::Value;

use crate::context::RenderContext;

/// Substitute every placeholder in `template` from `context`.
pub fn render(template: &str, context: &RenderContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        let Some(close) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };
        let inner = &tail[1..close];
        match substitute(inner, context) {
            Some(text) => out.push_str(&text),
            None => out.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    out
}

fn substitute(inner: &str, context: &RenderContext) -> Option<String> {
    let (name, spec) = match inner.split_once(':') {
        Some((name, spec)) => (name.trim(), spec),
        None => (inner.trim(), ""),
    };
    if name.is_empty() || name.contains('{') {
        return None;
    }
    let value = context.lookup(name)?;
    let spec = FormatSpec::parse(spec)?;
    spec.apply(value)
}

/// Plain-text form of a context value.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Shortest text for a float, keeping `.0` on integral values so `2.0`
/// never renders like the integer `2`.
fn float_text(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

// ---------------------------------------------------------------------------
// Format spec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
    AfterSign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    Negative,
    Always,
    Space,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FormatSpec {
    fill: char,
    align: Option<Align>,
    sign: Sign,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    kind: Option<char>,
}

fn align_of(c: char) -> Option<Align> {
    match c {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        '=' => Some(Align::AfterSign),
        _ => None,
    }
}

impl FormatSpec {
    fn parse(spec: &str) -> Option<Self> {
        let chars: Vec<char> = spec.chars().collect();
        let mut parsed = FormatSpec {
            fill: ' ',
            align: None,
            sign: Sign::Negative,
            zero: false,
            width: 0,
            precision: None,
            kind: None,
        };
        let mut i = 0;

        if chars.len() >= 2 && align_of(chars[1]).is_some() {
            parsed.fill = chars[0];
            parsed.align = align_of(chars[1]);
            i = 2;
        } else if let Some(align) = chars.first().copied().and_then(align_of) {
            parsed.align = Some(align);
            i = 1;
        }

        match chars.get(i) {
            Some('+') => {
                parsed.sign = Sign::Always;
                i += 1;
            }
            Some('-') => i += 1,
            Some(' ') => {
                parsed.sign = Sign::Space;
                i += 1;
            }
            _ => {}
        }

        if chars.get(i) == Some(&'0') {
            parsed.zero = true;
            i += 1;
        }

        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i > start {
            parsed.width = chars[start..i].iter().collect::<String>().parse().ok()?;
        }

        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(char::is_ascii_digit) {
                i += 1;
            }
            if i == start {
                return None;
            }
            parsed.precision = Some(chars[start..i].iter().collect::<String>().parse().ok()?);
        }

        if let Some(&kind) = chars.get(i) {
            if !"dsfxXob".contains(kind) {
                return None;
            }
            parsed.kind = Some(kind);
            i += 1;
        }

        (i == chars.len()).then_some(parsed)
    }

    fn apply(&self, value: &Value) -> Option<String> {
        match self.kind {
            Some('d') => self.integer(value, 10, false),
            Some('x') => self.integer(value, 16, false),
            Some('X') => self.integer(value, 16, true),
            Some('o') => self.integer(value, 8, false),
            Some('b') => self.integer(value, 2, false),
            Some('f') => self.float(value),
            Some('s') => Some(self.text(value)),
            _ => match value {
                Value::Number(n) if n.is_f64() => {
                    if self.precision.is_some() {
                        self.float(value)
                    } else {
                        let f = n.as_f64()?;
                        Some(self.pad_number(f.is_sign_negative(), float_text(f.abs())))
                    }
                }
                Value::Number(_) => self.integer(value, 10, false),
                _ => Some(self.text(value)),
            },
        }
    }

    fn integer(&self, value: &Value, radix: u32, upper: bool) -> Option<String> {
        let n: i128 = match value {
            Value::Number(n) => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        let magnitude = n.unsigned_abs();
        let digits = match (radix, upper) {
            (16, true) => format!("{magnitude:X}"),
            (16, false) => format!("{magnitude:x}"),
            (8, _) => format!("{magnitude:o}"),
            (2, _) => format!("{magnitude:b}"),
            _ => magnitude.to_string(),
        };
        Some(self.pad_number(n < 0, digits))
    }

    fn float(&self, value: &Value) -> Option<String> {
        let f = match value {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        let precision = self.precision.unwrap_or(6);
        Some(self.pad_number(f.is_sign_negative() && f != 0.0, format!("{:.*}", precision, f.abs())))
    }

    fn text(&self, value: &Value) -> String {
        let mut text = value_text(value);
        if let Some(max) = self.precision {
            text = text.chars().take(max).collect();
        }
        let align = self.align.unwrap_or(Align::Left);
        pad("", &text, self.width, self.fill, align)
    }

    fn pad_number(&self, negative: bool, digits: String) -> String {
        let sign = match (negative, self.sign) {
            (true, _) => "-",
            (false, Sign::Always) => "+",
            (false, Sign::Space) => " ",
            (false, Sign::Negative) => "",
        };
        let (fill, align) = match self.align {
            Some(align) => (self.fill, align),
            None if self.zero => ('0', Align::AfterSign),
            None => (self.fill, Align::Right),
        };
        pad(sign, &digits, self.width, fill, align)
    }
}

fn pad(sign: &str, body: &str, width: usize, fill: char, align: Align) -> String {
    let len = sign.chars().count() + body.chars().count();
    let missing = width.saturating_sub(len);
    let filler = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
    match align {
        Align::Left => format!("{sign}{body}{}", filler(missing)),
        Align::Right => format!("{}{sign}{body}", filler(missing)),
        Align::Center => {
            let left = missing / 2;
            format!("{}{sign}{body}{}", filler(left), filler(missing - left))
        }
        Align::AfterSign => format!("{sign}{}{body}", filler(missing)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RenderContext {
        RenderContext::new()
            .with("episode", 1)
            .with("sequence", 5)
            .with("shot", 12)
            .with("name", "hero")
            .with("neg", -7)
            .with("ratio", 1.5)
            .with("numeric_text", "42")
            .with("parent", json!({"code": "EP01_SQ05"}))
    }

    #[test]
    fn substitutes_plain_names() {
        assert_eq!(render("{name}_{shot}", &ctx()), "hero_12");
    }

    #[test]
    fn zero_padded_integers() {
        assert_eq!(render("EP{episode:02d}", &ctx()), "EP01");
        assert_eq!(render("SH{shot:04d}", &ctx()), "SH0012");
        assert_eq!(render("{neg:04d}", &ctx()), "-007");
        assert_eq!(render("{shot:02}", &ctx()), "12");
    }

    #[test]
    fn dotted_names_reach_into_objects() {
        assert_eq!(render("{parent.code}_SH{shot:02d}", &ctx()), "EP01_SQ05_SH12");
    }

    #[test]
    fn unknown_placeholders_pass_through() {
        assert_eq!(render("{missing}_{shot}", &ctx()), "{missing}_12");
        assert_eq!(render("{missing:03d}", &ctx()), "{missing:03d}");
        assert_eq!(render("{}", &ctx()), "{}");
    }

    #[test]
    fn inapplicable_spec_passes_through() {
        assert_eq!(render("{name:03d}", &ctx()), "{name:03d}");
        assert_eq!(render("{shot:q}", &ctx()), "{shot:q}");
    }

    #[test]
    fn escaped_and_unbalanced_braces() {
        assert_eq!(render("{{shot}}", &ctx()), "{shot}");
        assert_eq!(render("a}b", &ctx()), "a}b");
        assert_eq!(render("tail {shot", &ctx()), "tail {shot");
    }

    #[test]
    fn alignment_fill_and_precision() {
        assert_eq!(render("[{name:>6}]", &ctx()), "[  hero]");
        assert_eq!(render("[{name:*^8}]", &ctx()), "[**hero**]");
        assert_eq!(render("[{name:.2}]", &ctx()), "[he]");
        assert_eq!(render("{ratio:.2f}", &ctx()), "1.50");
        assert_eq!(render("{shot:+d}", &ctx()), "+12");
    }

    #[test]
    fn radix_types() {
        assert_eq!(render("{shot:x}", &ctx()), "c");
        assert_eq!(render("{shot:X}", &ctx()), "C");
        assert_eq!(render("{shot:08b}", &ctx()), "00001100");
        assert_eq!(render("{shot:o}", &ctx()), "14");
    }

    #[test]
    fn numeric_strings_accept_integer_specs() {
        assert_eq!(render("{numeric_text:05d}", &ctx()), "00042");
    }

    #[test]
    fn integral_floats_keep_their_decimal_point() {
        let values = RenderContext::new()
            .with("whole", 2.0)
            .with("below", -3.0)
            .with("count", 2);
        assert_eq!(render("{whole}|{below}|{count}", &values), "2.0|-3.0|2");
        assert_eq!(render("{ratio}", &ctx()), "1.5");
    }

    #[test]
    fn non_string_values_render_as_text() {
        let ctx = RenderContext::new()
            .with("flag", true)
            .with("nothing", Value::Null)
            .with("list", json!([1, 2]));
        assert_eq!(render("{flag}|{nothing}|{list}", &ctx), "true||[1,2]");
    }
}
