//! Plain text diff/patch.
//!
//! Diffs are character-level, computed with Myers' algorithm and grouped into
//! runs. Within a replaced region the deleted run comes before the added run.
//!
//! Patching is strict: every `UNCHANGED` and `DELETE` run must match the text
//! at the cursor and the whole input must be consumed. Merging is not: each
//! change is cut into a hunk with a little unchanged context on either side
//! and looked up near where the diff expects it, so text that other edits
//! have shifted or touched elsewhere still takes the change. A hunk whose
//! deleted text and context are all gone fails the merge.

use std::fmt;
use std::str::FromStr;

use diffsync_protocol::{DiffPatch, ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use similar::{Algorithm, DiffTag, TextDiff as CharDiff};

use crate::checksum::checksum_text;

/// Characters of unchanged context kept on each side of a hunk.
const HUNK_CONTEXT: usize = 32;

/// Farthest, in characters, a hunk may be found from where the diff expects it.
const MAX_DRIFT: usize = 1000;

/// Kind of a text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TextOperation {
    /// Text present only in the target.
    Add,
    /// Text present only in the source.
    Delete,
    /// Text present in both.
    Unchanged,
}

impl TextOperation {
    /// Returns the wire name of this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TextOperation::Add => "ADD",
            TextOperation::Delete => "DELETE",
            TextOperation::Unchanged => "UNCHANGED",
        }
    }
}

impl fmt::Display for TextOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextOperation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(TextOperation::Add),
            "DELETE" => Ok(TextOperation::Delete),
            "UNCHANGED" => Ok(TextOperation::Unchanged),
            other => Err(ProtocolError::UnsupportedOperation(other.to_string())),
        }
    }
}

impl TryFrom<String> for TextOperation {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TextOperation> for String {
    fn from(op: TextOperation) -> Self {
        op.as_str().to_string()
    }
}

/// One run of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDiff {
    /// Kind of run.
    pub operation: TextOperation,
    /// Text of the run.
    pub text: String,
}

impl TextDiff {
    /// Creates a run.
    pub fn new(operation: TextOperation, text: impl Into<String>) -> Self {
        Self {
            operation,
            text: text.into(),
        }
    }
}

/// Ordered runs turning one text into another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextDiffs(Vec<TextDiff>);

impl TextDiffs {
    /// Creates an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an unchanged run.
    pub fn unchanged(self, text: impl Into<String>) -> Self {
        self.with(TextOperation::Unchanged, text)
    }

    /// Appends an added run.
    pub fn add(self, text: impl Into<String>) -> Self {
        self.with(TextOperation::Add, text)
    }

    /// Appends a deleted run.
    pub fn delete(self, text: impl Into<String>) -> Self {
        self.with(TextOperation::Delete, text)
    }

    fn with(mut self, operation: TextOperation, text: impl Into<String>) -> Self {
        self.push(operation, text.into());
        self
    }

    /// Appends a run, merging it into the previous run of the same kind.
    /// Empty runs are dropped.
    pub fn push(&mut self, operation: TextOperation, text: String) {
        if text.is_empty() {
            return;
        }
        match self.0.last_mut() {
            Some(last) if last.operation == operation => last.text.push_str(&text),
            _ => self.0.push(TextDiff { operation, text }),
        }
    }

    /// Returns the runs.
    pub fn runs(&self) -> &[TextDiff] {
        &self.0
    }

    /// Returns true if the diff leaves text untouched.
    pub fn is_noop(&self) -> bool {
        self.0
            .iter()
            .all(|run| run.operation == TextOperation::Unchanged)
    }

    /// Returns the number of runs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no runs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<TextDiff>> for TextDiffs {
    fn from(runs: Vec<TextDiff>) -> Self {
        Self(runs)
    }
}

impl IntoIterator for TextDiffs {
    type Item = TextDiff;
    type IntoIter = std::vec::IntoIter<TextDiff>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Character-level text diff/patch.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPatcher;

impl TextPatcher {
    /// Creates a text patcher.
    pub fn new() -> Self {
        Self
    }
}

impl DiffPatch for TextPatcher {
    type Content = String;
    type Diff = TextDiffs;

    fn diff(&self, source: &String, target: &String) -> TextDiffs {
        let diff = CharDiff::configure()
            .algorithm(Algorithm::Myers)
            .diff_chars(source.as_str(), target.as_str());
        let old = diff.old_slices();
        let new = diff.new_slices();

        let mut diffs = TextDiffs::new();
        for op in diff.ops() {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            match tag {
                DiffTag::Equal => diffs.push(TextOperation::Unchanged, old[old_range].concat()),
                DiffTag::Delete => diffs.push(TextOperation::Delete, old[old_range].concat()),
                DiffTag::Insert => diffs.push(TextOperation::Add, new[new_range].concat()),
                DiffTag::Replace => {
                    diffs.push(TextOperation::Delete, old[old_range].concat());
                    diffs.push(TextOperation::Add, new[new_range].concat());
                }
            }
        }
        diffs
    }

    fn patch(&self, diff: &TextDiffs, content: &String) -> ProtocolResult<String> {
        let mut rest = content.as_str();
        let mut patched = String::with_capacity(content.len());

        for run in diff.runs() {
            match run.operation {
                TextOperation::Add => patched.push_str(&run.text),
                TextOperation::Unchanged | TextOperation::Delete => {
                    rest = rest.strip_prefix(run.text.as_str()).ok_or_else(|| {
                        ProtocolError::patch_failed(format!(
                            "{} run {:?} does not match text at offset {}",
                            run.operation,
                            run.text,
                            content.len() - rest.len()
                        ))
                    })?;
                    if run.operation == TextOperation::Unchanged {
                        patched.push_str(&run.text);
                    }
                }
            }
        }

        if !rest.is_empty() {
            return Err(ProtocolError::patch_failed(format!(
                "{} trailing bytes not covered by diff",
                rest.len()
            )));
        }
        Ok(patched)
    }

    fn merge(&self, diff: &TextDiffs, content: &String) -> ProtocolResult<String> {
        let mut text: Vec<char> = content.chars().collect();
        // Signed shift from source offsets to offsets in `text`.
        let mut drift: isize = 0;

        for hunk in Hunk::split(diff) {
            let expected = hunk.offset.saturating_add_signed(drift);
            let start = hunk.locate(&text, expected).ok_or_else(|| {
                ProtocolError::patch_failed(format!(
                    "change at offset {} no longer matches the text",
                    hunk.offset
                ))
            })?;
            text.splice(start..start + hunk.deleted.len(), hunk.inserted.iter().copied());
            drift = start as isize - hunk.offset as isize + hunk.inserted.len() as isize
                - hunk.deleted.len() as isize;
        }
        Ok(text.into_iter().collect())
    }

    fn checksum(&self, content: &String) -> String {
        checksum_text(content)
    }
}

/// One contiguous change plus the unchanged text around it.
#[derive(Debug)]
struct Hunk {
    /// Character offset of the change in the source text.
    offset: usize,
    before: Vec<char>,
    deleted: Vec<char>,
    inserted: Vec<char>,
    after: Vec<char>,
}

impl Hunk {
    fn split(diff: &TextDiffs) -> Vec<Hunk> {
        let runs = diff.runs();
        let mut hunks = Vec::new();
        let mut offset = 0;
        let mut i = 0;

        while i < runs.len() {
            if runs[i].operation == TextOperation::Unchanged {
                offset += runs[i].text.chars().count();
                i += 1;
                continue;
            }

            let before = match i.checked_sub(1).map(|prev| &runs[prev]) {
                Some(prev) => tail(&prev.text, HUNK_CONTEXT),
                None => Vec::new(),
            };
            let mut deleted = Vec::new();
            let mut inserted = Vec::new();
            while let Some(run) = runs.get(i).filter(|run| run.operation != TextOperation::Unchanged) {
                if run.operation == TextOperation::Delete {
                    deleted.extend(run.text.chars());
                } else {
                    inserted.extend(run.text.chars());
                }
                i += 1;
            }
            let after = runs
                .get(i)
                .map(|run| run.text.chars().take(HUNK_CONTEXT).collect())
                .unwrap_or_default();

            let hunk = Hunk {
                offset,
                before,
                deleted,
                inserted,
                after,
            };
            offset += hunk.deleted.len();
            hunks.push(hunk);
        }
        hunks
    }

    /// Finds where the deleted text starts in `text`, trying the full context
    /// first and then each side alone.
    fn locate(&self, text: &[char], expected: usize) -> Option<usize> {
        let patterns = [
            ([&self.before[..], &self.deleted[..], &self.after[..]].concat(), self.before.len()),
            ([&self.before[..], &self.deleted[..]].concat(), self.before.len()),
            ([&self.deleted[..], &self.after[..]].concat(), 0),
            (self.deleted.clone(), 0),
        ];

        let mut tried_any = false;
        for (pattern, lead) in &patterns {
            if pattern.is_empty() {
                continue;
            }
            tried_any = true;
            if let Some(at) = find_nearest(text, pattern, expected.saturating_sub(*lead)) {
                return Some(at + lead);
            }
        }
        // Only an insertion into empty source has nothing to anchor on.
        (!tried_any).then(|| expected.min(text.len()))
    }
}

fn tail(text: &str, count: usize) -> Vec<char> {
    let chars: Vec<char> = text.chars().collect();
    chars[chars.len().saturating_sub(count)..].to_vec()
}

fn find_nearest(text: &[char], pattern: &[char], target: usize) -> Option<usize> {
    if pattern.len() > text.len() {
        return None;
    }
    (0..=text.len() - pattern.len())
        .filter(|&at| text[at..at + pattern.len()] == *pattern)
        .min_by_key(|&at| at.abs_diff(target))
        .filter(|&at| at.abs_diff(target) <= MAX_DRIFT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn diff(source: &str, target: &str) -> TextDiffs {
        TextPatcher.diff(&source.to_string(), &target.to_string())
    }

    #[test]
    fn punctuation_change() {
        let diffs = diff("Do or do not, there is no try.", "Do or do not, there is no try!");
        assert_eq!(
            diffs,
            TextDiffs::new()
                .unchanged("Do or do not, there is no try")
                .delete(".")
                .add("!")
        );
    }

    #[test]
    fn identical_text_is_one_unchanged_run() {
        let diffs = diff("same", "same");
        assert_eq!(diffs, TextDiffs::new().unchanged("same"));
        assert!(diffs.is_noop());
        assert!(diff("", "").is_empty());
    }

    #[test]
    fn patch_applies_runs() {
        let diffs = TextDiffs::new().unchanged("Hello ").delete("world").add("there");
        let patched = TextPatcher.patch(&diffs, &"Hello world".to_string()).unwrap();
        assert_eq!(patched, "Hello there");
    }

    #[test]
    fn patch_rejects_mismatched_text() {
        let diffs = TextDiffs::new().unchanged("Hello ").delete("world");
        let err = TextPatcher
            .patch(&diffs, &"Hello moon".to_string())
            .unwrap_err();
        assert!(matches!(err, ProtocolError::PatchFailed(_)));
    }

    #[test]
    fn patch_rejects_uncovered_tail() {
        let diffs = TextDiffs::new().unchanged("Hello");
        let err = TextPatcher
            .patch(&diffs, &"Hello world".to_string())
            .unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    fn merge(source: &str, target: &str, into: &str) -> ProtocolResult<String> {
        TextPatcher.merge(&diff(source, target), &into.to_string())
    }

    #[test]
    fn merge_keeps_concurrent_edit() {
        assert_eq!(
            merge("hello world", "hello WORLD", "HELLO world").unwrap(),
            "HELLO WORLD"
        );
        assert_eq!(merge("abc", "xbc", "abcd").unwrap(), "xbcd");
    }

    #[test]
    fn merge_follows_shifted_text() {
        assert_eq!(
            merge("one two", "one two three", "zero one two").unwrap(),
            "zero one two three"
        );
        assert_eq!(
            merge("a b c d", "a B c D", "intro: a b c d").unwrap(),
            "intro: a B c D"
        );
    }

    #[test]
    fn merge_fails_when_deleted_text_is_gone() {
        let err = merge("hello world", "hello", "hello WORLD").unwrap_err();
        assert!(matches!(err, ProtocolError::PatchFailed(_)));
    }

    #[test]
    fn merge_into_empty_source() {
        assert_eq!(merge("", "new", "").unwrap(), "new");
        assert_eq!(merge("same", "same", "changed").unwrap(), "changed");
    }

    #[test]
    fn multibyte_text() {
        let source = "naïve café".to_string();
        let target = "naive cafés".to_string();
        let diffs = TextPatcher.diff(&source, &target);
        assert_eq!(TextPatcher.patch(&diffs, &source).unwrap(), target);
    }

    #[test]
    fn wire_format() {
        let diffs = TextDiffs::new().unchanged("a").delete("b").add("c");
        let json = serde_json::to_value(&diffs).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"operation": "UNCHANGED", "text": "a"},
                {"operation": "DELETE", "text": "b"},
                {"operation": "ADD", "text": "c"}
            ])
        );
    }

    #[test]
    fn unknown_operation_is_unsupported() {
        let err = "MOVE".parse::<TextOperation>().unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedOperation(ref op) if op == "MOVE"));

        let json = r#"[{"operation":"MOVE","text":"x"}]"#;
        let err = serde_json::from_str::<TextDiffs>(json).unwrap_err();
        assert!(err.to_string().contains("unsupported diff operation: MOVE"));
    }

    #[test]
    fn checksum_is_of_content() {
        let a = TextPatcher.checksum(&"a".to_string());
        assert_eq!(a, checksum_text("a"));
        assert_ne!(a, TextPatcher.checksum(&"b".to_string()));
    }

    proptest! {
        #[test]
        fn patch_of_diff_reaches_target(source in "\\PC{0,40}", target in "\\PC{0,40}") {
            let diffs = TextPatcher.diff(&source, &target);
            prop_assert_eq!(TextPatcher.patch(&diffs, &source).unwrap(), target);
        }

        #[test]
        fn merge_into_unchanged_source_matches_patch(source in "\\PC{0,40}", target in "\\PC{0,40}") {
            let diffs = TextPatcher.diff(&source, &target);
            prop_assert_eq!(TextPatcher.merge(&diffs, &source).unwrap(), target);
        }

        #[test]
        fn diff_runs_never_repeat_kind(source in "[ab ]{0,30}", target in "[ab ]{0,30}") {
            let diffs = TextPatcher.diff(&source, &target);
            for pair in diffs.runs().windows(2) {
                prop_assert_ne!(pair[0].operation, pair[1].operation);
            }
        }
    }
}
