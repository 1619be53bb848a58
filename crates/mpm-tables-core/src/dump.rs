//! Plain-text payload parsing for timestep dumps.
//!
//! A dump is a flat sequence of whitespace-separated floats. Line breaks
//! carry no meaning beyond separating values; text after `#` is a comment.

use snafu::Snafu;

/// A token that is not a floating-point number.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("line {line}: '{token}' is not a number"))]
pub struct InvalidNumber {
    /// 1-based line number of the token.
    pub line: usize,
    /// The offending token.
    pub token: String,
}

/// Parse every value of a dump in file order.
pub fn parse_payload(text: &str) -> Result<Vec<f64>, InvalidNumber> {
    let mut values = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let data = match line.split_once('#') {
            Some((data, _comment)) => data,
            None => line,
        };
        for token in data.split_whitespace() {
            let value = token.parse::<f64>().map_err(|_| InvalidNumber {
                line: idx + 1,
                token: token.to_string(),
            })?;
            values.push(value);
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_values_across_lines_and_columns() {
        let text = "1.5 -2\n3e-2\t4\n\n  5.25  \n";
        assert_eq!(
            parse_payload(text).unwrap(),
            vec![1.5, -2.0, 0.03, 4.0, 5.25]
        );
    }

    #[test]
    fn skips_comments() {
        let text = "# header\n1 2 # trailing\n3\n";
        assert_eq!(parse_payload(text).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn reports_line_of_bad_token() {
        let err = parse_payload("1 2\n3 abc 4\n").unwrap_err();
        assert_eq!(
            err,
            InvalidNumber {
                line: 2,
                token: "abc".to_string()
            }
        );
    }

    #[test]
    fn empty_text_is_empty_payload() {
        assert!(parse_payload("").unwrap().is_empty());
    }
}
