//! Page range expressions such as `1-3, 5, 8-10`, `z-1` or `1-z:odd`

use crate::error::{Error, Result};

/// One endpoint of a range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageRef {
    /// 1-indexed page number
    Page(u32),
    /// `z`: the last page
    Last,
    /// `rN`: N-th page counting from the end, `r1` being the last
    FromEnd(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parity {
    Odd,
    Even,
}

impl PageRef {
    fn parse(token: &str, expr: &str) -> Result<Self> {
        let token = token.trim();
        let invalid = || Error::InvalidPageRange {
            range: expr.to_string(),
        };

        if token.eq_ignore_ascii_case("z") {
            return Ok(PageRef::Last);
        }
        if let Some(n) = token.strip_prefix('r') {
            return n.parse().map(PageRef::FromEnd).map_err(|_| invalid());
        }
        token.parse().map(PageRef::Page).map_err(|_| invalid())
    }

    /// Resolve to a 1-indexed page number within `1..=total`
    fn resolve(self, total: u32) -> Result<u32> {
        let page = match self {
            PageRef::Page(n) => n,
            PageRef::Last => total,
            PageRef::FromEnd(n) if n >= 1 && n <= total => total - n + 1,
            PageRef::FromEnd(n) => {
                return Err(Error::InvalidPageRange {
                    range: format!("r{} out of range (1-{})", n, total),
                })
            }
        };
        if page == 0 || page > total {
            return Err(Error::InvalidPageRange {
                range: format!("page {} out of range (1-{})", page, total),
            });
        }
        Ok(page)
    }
}

/// Expand a page range expression into 1-indexed page numbers, in the order given.
///
/// Comma separated parts, each one of:
/// - `N` a single page, `z` the last page, `rN` the N-th from the end
/// - `A-B` an inclusive range, descending when `A > B`
/// - a range followed by `:odd` or `:even`
///
/// Duplicates are kept, so `1,1` yields page 1 twice.
pub fn parse_page_range(expr: &str, total: u32) -> Result<Vec<u32>> {
    if total == 0 {
        return Err(Error::InvalidPdf {
            reason: "PDF has no pages".to_string(),
        });
    }

    let mut pages = Vec::new();

    for part in expr.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (span, parity) = match part.rsplit_once(':') {
            Some((span, "odd")) => (span, Some(Parity::Odd)),
            Some((span, "even")) => (span, Some(Parity::Even)),
            Some(_) => {
                return Err(Error::InvalidPageRange {
                    range: part.to_string(),
                })
            }
            None => (part, None),
        };

        let expanded: Vec<u32> = match span.split_once('-') {
            Some((start, end)) => {
                let start = PageRef::parse(start, part)?.resolve(total)?;
                let end = PageRef::parse(end, part)?.resolve(total)?;
                if start <= end {
                    (start..=end).collect()
                } else {
                    (end..=start).rev().collect()
                }
            }
            None => vec![PageRef::parse(span, part)?.resolve(total)?],
        };

        pages.extend(expanded.into_iter().filter(|p| match parity {
            Some(Parity::Odd) => p % 2 == 1,
            Some(Parity::Even) => p % 2 == 0,
            None => true,
        }));
    }

    if pages.is_empty() {
        return Err(Error::InvalidPageRange {
            range: expr.to_string(),
        });
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("3", 10, vec![3])]
    #[case("1-3", 10, vec![1, 2, 3])]
    #[case("1-3, 5, 8-10", 10, vec![1, 2, 3, 5, 8, 9, 10])]
    #[case("z", 5, vec![5])]
    #[case("r1", 5, vec![5])]
    #[case("r2", 5, vec![4])]
    #[case("3-1", 5, vec![3, 2, 1])]
    #[case("z-1", 3, vec![3, 2, 1])]
    #[case("5-z", 6, vec![5, 6])]
    #[case("1-6:odd", 10, vec![1, 3, 5])]
    #[case("1-z:even", 7, vec![2, 4, 6])]
    #[case("1,1", 3, vec![1, 1])]
    #[case(" 2 , ,3 ", 3, vec![2, 3])]
    fn test_parse(#[case] expr: &str, #[case] total: u32, #[case] expected: Vec<u32>) {
        assert_eq!(parse_page_range(expr, total).unwrap(), expected);
    }

    #[rstest]
    #[case("0")]
    #[case("11")]
    #[case("abc")]
    #[case("r0")]
    #[case("r11")]
    #[case("1-3:prime")]
    #[case("2-2:odd")]
    #[case("")]
    #[case(" , ")]
    fn test_parse_invalid(#[case] expr: &str) {
        assert!(matches!(
            parse_page_range(expr, 10),
            Err(Error::InvalidPageRange { .. })
        ));
    }

    #[test]
    fn test_parse_empty_document() {
        assert!(matches!(
            parse_page_range("1", 0),
            Err(Error::InvalidPdf { .. })
        ));
    }
}
