//! Loop transpilation for WGSL code generation.
//!
//! Handles Rust for/while/loop constructs and converts them to WGSL equivalents.

/// Represents recognized loop patterns from Rust DSL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopPattern {
    /// `for i in start..end` or `start..=end`.
    ForRange {
        /// Loop variable.
        var: String,
        /// WGSL type of the loop variable.
        ty: String,
        /// Start expression.
        start: String,
        /// End expression.
        end: String,
        /// Whether the end is included.
        inclusive: bool,
    },
    /// `while condition { ... }`
    While {
        /// Loop condition.
        condition: String,
    },
    /// `loop { ... }` - infinite loop with break
    Loop,
}

impl LoopPattern {
    /// Generate the WGSL loop header.
    pub fn to_wgsl_header(&self) -> String {
        match self {
            LoopPattern::ForRange {
                var,
                ty,
                start,
                end,
                inclusive,
            } => {
                let op = if *inclusive { "<=" } else { "<" };
                let one = if ty == "u32" { "1u" } else { "1" };
                format!("for (var {var}: {ty} = {start}; {var} {op} {end}; {var} = {var} + {one})")
            }
            LoopPattern::While { condition } => format!("while ({condition})"),
            LoopPattern::Loop => "loop".to_string(),
        }
    }
}

/// Information about a range expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeInfo {
    /// Start of range (or None for `..end`)
    pub start: Option<String>,
    /// End of range (or None for `start..`)
    pub end: Option<String>,
    /// Whether the range is inclusive (`..=`)
    pub inclusive: bool,
}

impl RangeInfo {
    /// Create a new range info.
    pub fn new(start: Option<String>, end: Option<String>, inclusive: bool) -> Self {
        Self {
            start,
            end,
            inclusive,
        }
    }

    /// Get the start expression, defaulting to a zero of `ty`.
    pub fn start_or_default(&self, ty: &str) -> String {
        self.start.clone().unwrap_or_else(|| {
            if ty == "u32" {
                "0u".to_string()
            } else {
                "0".to_string()
            }
        })
    }

    /// Get the end expression, or None if unbounded.
    pub fn end_expr(&self) -> Option<&str> {
        self.end.as_deref()
    }
}

/// Convert a Rust range to a WGSL for loop pattern.
///
/// Returns `None` for unbounded ranges.
pub fn range_to_for_loop(var: &str, ty: &str, range: &RangeInfo) -> Option<LoopPattern> {
    Some(LoopPattern::ForRange {
        var: var.to_string(),
        ty: ty.to_string(),
        start: range.start_or_default(ty),
        end: range.end.clone()?,
        inclusive: range.inclusive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_range_exclusive() {
        let pattern = LoopPattern::ForRange {
            var: "i".to_string(),
            ty: "i32".to_string(),
            start: "0".to_string(),
            end: "10".to_string(),
            inclusive: false,
        };
        assert_eq!(
            pattern.to_wgsl_header(),
            "for (var i: i32 = 0; i < 10; i = i + 1)"
        );
    }

    #[test]
    fn test_for_range_inclusive_unsigned() {
        let pattern = LoopPattern::ForRange {
            var: "j".to_string(),
            ty: "u32".to_string(),
            start: "1u".to_string(),
            end: "n".to_string(),
            inclusive: true,
        };
        assert_eq!(
            pattern.to_wgsl_header(),
            "for (var j: u32 = 1u; j <= n; j = j + 1u)"
        );
    }

    #[test]
    fn test_while_loop() {
        let pattern = LoopPattern::While {
            condition: "x > 0".to_string(),
        };
        assert_eq!(pattern.to_wgsl_header(), "while (x > 0)");
    }

    #[test]
    fn test_infinite_loop() {
        assert_eq!(LoopPattern::Loop.to_wgsl_header(), "loop");
    }

    #[test]
    fn test_range_info() {
        let range = RangeInfo::new(None, Some("10".to_string()), false);
        let pattern = range_to_for_loop("i", "u32", &range).unwrap();
        assert_eq!(
            pattern.to_wgsl_header(),
            "for (var i: u32 = 0u; i < 10; i = i + 1u)"
        );

        let unbounded = RangeInfo::new(Some("0".to_string()), None, false);
        assert!(range_to_for_loop("i", "i32", &unbounded).is_none());
    }
}
