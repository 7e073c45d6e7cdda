//! Character-level text diff strategy.
//!
//! A diff is the whole source string rewritten as a sequence of
//! `UNCHANGED`/`DELETE`/`ADD` runs. Applying it is a single left-to-right
//! pass over the source:
//!
//! ```text
//! source:  "Hello world"
//! diffs:   [UNCHANGED "Hello ", DELETE "world", ADD "there"]
//! result:  "Hello there"
//! ```
//!
//! The diff itself is Myers' O(ND) edit script in its linear-space form,
//! run over the characters left after stripping the common prefix and
//! suffix. Work is capped per call; past the cap the remaining spans are
//! replaced wholesale instead of searched.

use crate::error::ApplyError;
use crate::strategy::Strategy;
use serde::{Deserialize, Serialize};

/// What a run of text does to the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Unchanged,
    Delete,
    Add,
}

/// A run of text tagged with its operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDiff {
    pub operation: Operation,
    pub text: String,
}

impl TextDiff {
    pub fn new(operation: Operation, text: impl Into<String>) -> Self {
        Self {
            operation,
            text: text.into(),
        }
    }
}

/// Text strategy: content is a plain string.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextDiffStrategy;

impl TextDiffStrategy {
    pub const NAME: &'static str = "text-diff";
}

impl Strategy for TextDiffStrategy {
    type Content = String;
    type Diff = TextDiff;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn diff(&self, before: &String, after: &String) -> Vec<TextDiff> {
        if before == after {
            return Vec::new();
        }

        let a: Vec<char> = before.chars().collect();
        let b: Vec<char> = after.chars().collect();

        let mut runs = RunBuilder::default();
        let mut budget = DIFF_WORK_BUDGET;
        diff_chars(&a, &b, &mut budget, &mut runs);
        runs.finish()
    }

    fn apply(&self, content: &String, diffs: &[TextDiff]) -> Result<String, ApplyError> {
        let mut out = String::with_capacity(content.len());
        let mut rest = content.as_str();

        for diff in diffs {
            match diff.operation {
                Operation::Add => out.push_str(&diff.text),
                Operation::Unchanged | Operation::Delete => {
                    rest = rest.strip_prefix(diff.text.as_str()).ok_or_else(|| {
                        ApplyError::TextMismatch {
                            offset: content.len() - rest.len(),
                            expected: diff.text.clone(),
                        }
                    })?;
                    if diff.operation == Operation::Unchanged {
                        out.push_str(&diff.text);
                    }
                }
            }
        }

        if !rest.is_empty() {
            return Err(ApplyError::TrailingContent(rest.chars().count()));
        }
        Ok(out)
    }

    /// Both lists rewrite a whole string, so they cannot be replayed back to
    /// back. Rebuild the first list's source and the second list's target
    /// and diff those instead.
    fn compose(&self, first: Vec<TextDiff>, second: Vec<TextDiff>) -> Vec<TextDiff> {
        if first.is_empty() {
            return second;
        }
        if second.is_empty() {
            return first;
        }
        let source = collect(&first, Operation::Delete);
        let target = collect(&second, Operation::Add);
        self.diff(&source, &target)
    }
}

/// Concatenate the unchanged runs with the runs of kind `side`.
fn collect(diffs: &[TextDiff], side: Operation) -> String {
    diffs
        .iter()
        .filter(|d| d.operation == Operation::Unchanged || d.operation == side)
        .map(|d| d.text.as_str())
        .collect()
}

/// Merges single-character operations into runs. Between two unchanged runs
/// all deletions are emitted before all additions.
#[derive(Default)]
struct RunBuilder {
    runs: Vec<TextDiff>,
    deleted: String,
    added: String,
}

impl RunBuilder {
    fn push(&mut self, op: Operation, c: char) {
        match op {
            Operation::Delete => self.deleted.push(c),
            Operation::Add => self.added.push(c),
            Operation::Unchanged => {
                self.flush();
                match self.runs.last_mut() {
                    Some(last) if last.operation == Operation::Unchanged => last.text.push(c),
                    _ => self.runs.push(TextDiff::new(Operation::Unchanged, c.to_string())),
                }
            }
        }
    }

    fn push_str(&mut self, op: Operation, chars: &[char]) {
        for &c in chars {
            self.push(op, c);
        }
    }

    fn flush(&mut self) {
        if !self.deleted.is_empty() {
            let text = std::mem::take(&mut self.deleted);
            self.runs.push(TextDiff::new(Operation::Delete, text));
        }
        if !self.added.is_empty() {
            let text = std::mem::take(&mut self.added);
            self.runs.push(TextDiff::new(Operation::Add, text));
        }
    }

    fn finish(mut self) -> Vec<TextDiff> {
        self.flush();
        self.runs
    }
}

/// Upper bound on the edit-graph cells a single diff may explore. Once it is
/// spent, the remaining unresolved spans are emitted as a plain delete and
/// add, which is still a correct diff, only not a minimal one.
const DIFF_WORK_BUDGET: usize = 1 << 24;

/// Edit script from `a` to `b`, pushed onto `runs` in source order.
///
/// Linear-space Myers: find the middle snake of the edit graph, then solve
/// the two halves on either side of it.
fn diff_chars(a: &[char], b: &[char], budget: &mut usize, runs: &mut RunBuilder) {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    runs.push_str(Operation::Unchanged, &a[..prefix]);
    let (mid_a, mid_b) = (&a[prefix..a.len() - suffix], &b[prefix..b.len() - suffix]);

    if mid_a.is_empty() || mid_b.is_empty() {
        runs.push_str(Operation::Delete, mid_a);
        runs.push_str(Operation::Add, mid_b);
    } else {
        match middle_snake(mid_a, mid_b, budget) {
            Some((x, y)) if splits(x, y, mid_a.len(), mid_b.len()) => {
                diff_chars(&mid_a[..x], &mid_b[..y], budget, runs);
                diff_chars(&mid_a[x..], &mid_b[y..], budget, runs);
            }
            _ => {
                runs.push_str(Operation::Delete, mid_a);
                runs.push_str(Operation::Add, mid_b);
            }
        }
    }

    runs.push_str(Operation::Unchanged, &a[a.len() - suffix..]);
}

/// Whether (x, y) cuts both spans into strictly smaller subproblems.
fn splits(x: usize, y: usize, n: usize, m: usize) -> bool {
    x <= n && y <= m && (x, y) != (0, 0) && (x, y) != (n, m)
}

/// Point where the forward and reverse searches meet, or `None` when the
/// spans share nothing or the work budget ran out.
fn middle_snake(a: &[char], b: &[char], budget: &mut usize) -> Option<(usize, usize)> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max_d = (n + m + 1) / 2;
    let offset = max_d;
    let len = (2 * max_d + 2) as usize;
    let mut forward = vec![-1isize; len];
    let mut reverse = vec![-1isize; len];
    forward[(offset + 1) as usize] = 0;
    reverse[(offset + 1) as usize] = 0;

    let delta = n - m;
    let odd = delta % 2 != 0;
    let (mut k1_start, mut k1_end, mut k2_start, mut k2_end) = (0, 0, 0, 0);

    for d in 0..max_d {
        let cost = 2 * d as usize + 2;
        if *budget < cost {
            *budget = 0;
            return None;
        }
        *budget -= cost;

        let mut k1 = -d + k1_start;
        while k1 <= d - k1_end {
            let i = (offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && forward[i - 1] < forward[i + 1]) {
                forward[i + 1]
            } else {
                forward[i - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 < n && y1 < m && a[x1 as usize] == b[y1 as usize] {
                x1 += 1;
                y1 += 1;
            }
            forward[i] = x1;
            if x1 > n {
                k1_end += 2;
            } else if y1 > m {
                k1_start += 2;
            } else if odd {
                let j = offset + delta - k1;
                if j >= 0 && (j as usize) < len && reverse[j as usize] != -1 {
                    let x2 = n - reverse[j as usize];
                    if x1 >= x2 {
                        return Some((x1 as usize, y1 as usize));
                    }
                }
            }
            k1 += 2;
        }

        let mut k2 = -d + k2_start;
        while k2 <= d - k2_end {
            let i = (offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && reverse[i - 1] < reverse[i + 1]) {
                reverse[i + 1]
            } else {
                reverse[i - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 < n && y2 < m && a[(n - x2 - 1) as usize] == b[(m - y2 - 1) as usize] {
                x2 += 1;
                y2 += 1;
            }
            reverse[i] = x2;
            if x2 > n {
                k2_end += 2;
            } else if y2 > m {
                k2_start += 2;
            } else if !odd {
                let j = offset + delta - k2;
                if j >= 0 && (j as usize) < len && forward[j as usize] != -1 {
                    let x1 = forward[j as usize];
                    let y1 = x1 - (j - offset);
                    if x1 >= n - x2 {
                        return Some((x1 as usize, y1 as usize));
                    }
                }
            }
            k2 += 2;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_diff(before: &str, after: &str) -> String {
        let strategy = TextDiffStrategy;
        let (before, after) = (before.to_string(), after.to_string());
        let diffs = strategy.diff(&before, &after);
        strategy.apply(&before, &diffs).unwrap()
    }

    #[test]
    fn test_simple_replacement() {
        let strategy = TextDiffStrategy;
        let diffs = strategy.diff(&"Hello world".to_string(), &"Hello there".to_string());

        assert_eq!(diffs.first(), Some(&TextDiff::new(Operation::Unchanged, "Hello ")));
        assert_eq!(apply_diff("Hello world", "Hello there"), "Hello there");
    }

    #[test]
    fn test_identical_strings_have_no_diff() {
        let text = "unchanged".to_string();
        assert!(TextDiffStrategy.diff(&text, &text).is_empty());
    }

    #[test]
    fn test_edge_cases() {
        assert_eq!(apply_diff("", "abc"), "abc");
        assert_eq!(apply_diff("abc", ""), "");
        assert_eq!(apply_diff("abc", "xyz"), "xyz");
        assert_eq!(apply_diff("kitten", "sitting"), "sitting");
        assert_eq!(apply_diff("naïve café", "naive cafe ☕"), "naive cafe ☕");
    }

    #[test]
    fn test_runs_are_merged() {
        let diffs = TextDiffStrategy.diff(&"aaa".to_string(), &"bbb".to_string());
        assert_eq!(
            diffs,
            vec![
                TextDiff::new(Operation::Delete, "aaa"),
                TextDiff::new(Operation::Add, "bbb"),
            ]
        );
    }

    #[test]
    fn test_disjoint_large_strings_stay_bounded() {
        let before = "a".repeat(20_000);
        let after = "b".repeat(20_000);

        let diffs = TextDiffStrategy.diff(&before, &after);
        assert_eq!(
            diffs,
            vec![
                TextDiff::new(Operation::Delete, before.clone()),
                TextDiff::new(Operation::Add, after.clone()),
            ]
        );
    }

    #[test]
    fn test_sparse_edits_in_large_text() {
        let before = "lorem ipsum dolor ".repeat(3_000);
        let mut after = before.clone();
        after.insert_str(10_000, "XYZ");
        after.replace_range(40_000..40_005, "");

        let strategy = TextDiffStrategy;
        let diffs = strategy.diff(&before, &after);
        assert_eq!(strategy.apply(&before, &diffs).unwrap(), after);

        let changed: usize = diffs
            .iter()
            .filter(|d| d.operation != Operation::Unchanged)
            .map(|d| d.text.chars().count())
            .sum();
        assert!(changed <= 16, "diff touched {} characters", changed);
    }

    #[test]
    fn test_interleaved_changes_round_trip() {
        let before = "the quick brown fox jumps over the lazy dog".to_string();
        let after = "a quick red fox leaped over two lazy dogs".to_string();
        let strategy = TextDiffStrategy;
        let diffs = strategy.diff(&before, &after);

        assert_eq!(strategy.apply(&before, &diffs).unwrap(), after);
        assert!(diffs.len() > 2);
    }

    #[test]
    fn test_apply_rejects_mismatch_and_leftovers() {
        let strategy = TextDiffStrategy;
        let source = "Hello".to_string();

        let mismatch = vec![TextDiff::new(Operation::Unchanged, "Help")];
        assert!(matches!(
            strategy.apply(&source, &mismatch),
            Err(ApplyError::TextMismatch { offset: 0, .. })
        ));

        let short = vec![TextDiff::new(Operation::Unchanged, "Hel")];
        assert_eq!(
            strategy.apply(&source, &short),
            Err(ApplyError::TrailingContent(2))
        );
    }

    #[test]
    fn test_wire_format() {
        let diff = TextDiff::new(Operation::Unchanged, "abc");
        assert_eq!(
            serde_json::to_string(&diff).unwrap(),
            r#"{"operation":"UNCHANGED","text":"abc"}"#
        );
    }

    #[test]
    fn test_compose_consecutive_edits() {
        let strategy = TextDiffStrategy;
        let v0 = "one".to_string();
        let v1 = "one two".to_string();
        let v2 = "zero one two".to_string();

        let composed = strategy.compose(strategy.diff(&v0, &v1), strategy.diff(&v1, &v2));
        assert_eq!(strategy.apply(&v0, &composed).unwrap(), v2);
    }
}
