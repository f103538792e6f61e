use similar::{Algorithm, ChangeTag, TextDiff};
use std::fmt::Debug;
use std::time::Duration;

/// Past this, the diff falls back to a coarser but still correct result.
const DIFF_DEADLINE: Duration = Duration::from_millis(200);

/// Pretty-prints both values and returns a line diff, or `None` when they render identically.
pub(crate) fn diff_debug<T: Debug + ?Sized>(expected: &T, actual: &T) -> Option<String> {
    diff_lines(&format!("{expected:#?}"), &format!("{actual:#?}"))
}

/// Line-oriented diff of two renderings.
///
/// Lines only in `expected` are prefixed with `-`, lines only in `actual` with `+`,
/// shared lines with two spaces.
pub(crate) fn diff_lines(expected: &str, actual: &str) -> Option<String> {
    if expected == actual {
        return None;
    }
    let old: Vec<&str> = expected.lines().collect();
    let new: Vec<&str> = actual.lines().collect();
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .timeout(DIFF_DEADLINE)
        .diff_slices(&old, &new);

    let lines: Vec<String> = diff
        .iter_all_changes()
        .map(|change| {
            let sign = match change.tag() {
                ChangeTag::Delete => '-',
                ChangeTag::Insert => '+',
                ChangeTag::Equal => ' ',
            };
            format!("{sign} {}", change.value())
        })
        .collect();
    Some(lines.join("\n"))
}
