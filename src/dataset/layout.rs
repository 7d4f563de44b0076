//! Dataset directory layout
//!
//! A dataset root is expected to look like:
//! ```text
//! root/
//! ├── train/
//! │   ├── cat/
//! │   └── dog/
//! ├── test/
//! │   ├── cat/
//! │   └── dog/
//! └── eval/
//!     ├── cat/
//!     └── dog/
//! ```
//!
//! with the same class subdirectories under every split.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};

use crate::utils::error::UniTrainError;

/// One of the three dataset splits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Test,
    Eval,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Test, Split::Eval];

    /// Directory name of this split under the dataset root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
            Split::Eval => "eval",
        }
    }
}

impl FromStr for Split {
    type Err = UniTrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            "eval" => Ok(Split::Eval),
            other => Err(UniTrainError::configuration(format!(
                "unknown split '{}' (expected train, test or eval)",
                other
            ))),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Resolved split directories of a well-formed dataset root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPaths {
    /// Class names shared by all splits, sorted
    pub classes: BTreeSet<String>,
    pub train: PathBuf,
    pub test: PathBuf,
    pub eval: PathBuf,
}

impl SplitPaths {
    pub fn path(&self, split: Split) -> &Path {
        match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
            Split::Eval => &self.eval,
        }
    }
}

/// Why a dataset root was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutIssue {
    #[error("dataset root '{}' does not exist", .0.display())]
    MissingRoot(PathBuf),

    #[error("split directory '{}' is missing", .0.display())]
    MissingSplit(PathBuf),

    #[error("class folders differ between '{first}' and '{second}'")]
    ClassMismatch { first: Split, second: Split },

    #[error("cannot list '{}': {message}", .path.display())]
    Unreadable { path: PathBuf, message: String },
}

/// Outcome of [`parse_folder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderLayout {
    Valid(SplitPaths),
    Invalid(LayoutIssue),
}

impl FolderLayout {
    pub fn is_valid(&self) -> bool {
        matches!(self, FolderLayout::Valid(_))
    }

    /// Convert into a `Result` for callers that cannot continue without data
    pub fn into_result(self) -> crate::Result<SplitPaths> {
        match self {
            FolderLayout::Valid(paths) => Ok(paths),
            FolderLayout::Invalid(issue) => Err(UniTrainError::DatasetLayout(issue.to_string())),
        }
    }
}

/// Sorted names of the immediate subdirectories of `dir`
///
/// These names are the label vocabulary: label `i` is the `i`-th name.
pub fn list_class_dirs(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut classes = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                classes.push(name.to_string());
            }
        }
    }
    classes.sort();
    Ok(classes)
}

fn check_layout(root: &Path) -> Result<SplitPaths, LayoutIssue> {
    if !root.is_dir() {
        return Err(LayoutIssue::MissingRoot(root.to_path_buf()));
    }
    let split_dir = |split: Split| root.join(split.dir_name());

    let mut class_sets: Vec<(Split, BTreeSet<String>)> = Vec::with_capacity(3);
    for split in Split::ALL {
        let path = split_dir(split);
        if !path.is_dir() {
            return Err(LayoutIssue::MissingSplit(path));
        }
        let classes = list_class_dirs(&path).map_err(|e| LayoutIssue::Unreadable {
            path: path.clone(),
            message: e.to_string(),
        })?;
        class_sets.push((split, classes.into_iter().collect()));
    }

    let (first, classes) = class_sets.remove(0);
    if let Some((second, _)) = class_sets.iter().find(|(_, other)| *other != classes) {
        return Err(LayoutIssue::ClassMismatch {
            first,
            second: *second,
        });
    }

    Ok(SplitPaths {
        classes,
        train: split_dir(Split::Train),
        test: split_dir(Split::Test),
        eval: split_dir(Split::Eval),
    })
}

/// Inspect a dataset root for `train`/`test`/`eval` splits with matching classes
///
/// Never fails: a malformed root is reported as [`FolderLayout::Invalid`] so
/// the caller can fix the path and try again.
pub fn parse_folder(root: impl AsRef<Path>) -> FolderLayout {
    let root = root.as_ref();
    match check_layout(root) {
        Ok(paths) => {
            info!(
                "Dataset at {:?}: {} classes, splits train/test/eval",
                root,
                paths.classes.len()
            );
            FolderLayout::Valid(paths)
        }
        Err(issue) => {
            warn!("Invalid dataset layout at {:?}: {}", root, issue);
            FolderLayout::Invalid(issue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_split(root: &Path, split: &str, classes: &[&str]) {
        for class in classes {
            fs::create_dir_all(root.join(split).join(class)).unwrap();
        }
    }

    #[test]
    fn test_valid_layout() {
        let tmp = TempDir::new().unwrap();
        for split in ["train", "test", "eval"] {
            make_split(tmp.path(), split, &["dog", "cat"]);
        }

        match parse_folder(tmp.path()) {
            FolderLayout::Valid(paths) => {
                let classes: Vec<_> = paths.classes.iter().cloned().collect();
                assert_eq!(classes, vec!["cat", "dog"]);
                assert_eq!(paths.train, tmp.path().join("train"));
                assert_eq!(paths.test, tmp.path().join("test"));
                assert_eq!(paths.eval, tmp.path().join("eval"));
                assert_eq!(paths.path(Split::Eval), tmp.path().join("eval"));
            }
            FolderLayout::Invalid(issue) => panic!("unexpected issue: {}", issue),
        }
    }

    #[test]
    fn test_missing_eval_split_is_invalid() {
        let tmp = TempDir::new().unwrap();
        make_split(tmp.path(), "train", &["cat"]);
        make_split(tmp.path(), "test", &["cat"]);

        assert_eq!(
            parse_folder(tmp.path()),
            FolderLayout::Invalid(LayoutIssue::MissingSplit(tmp.path().join("eval")))
        );
    }

    #[test]
    fn test_missing_root_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let layout = parse_folder(tmp.path().join("nope"));
        assert!(matches!(
            layout,
            FolderLayout::Invalid(LayoutIssue::MissingRoot(_))
        ));
    }

    #[test]
    fn test_class_mismatch_is_invalid() {
        let tmp = TempDir::new().unwrap();
        make_split(tmp.path(), "train", &["cat", "dog"]);
        make_split(tmp.path(), "test", &["cat", "dog"]);
        make_split(tmp.path(), "eval", &["cat"]);

        let layout = parse_folder(tmp.path());
        assert_eq!(
            layout,
            FolderLayout::Invalid(LayoutIssue::ClassMismatch {
                first: Split::Train,
                second: Split::Eval,
            })
        );
        assert!(matches!(
            layout.into_result(),
            Err(UniTrainError::DatasetLayout(_))
        ));
    }

    #[test]
    fn test_class_listing_ignores_files() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("b")).unwrap();
        fs::create_dir(tmp.path().join("a")).unwrap();
        fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        assert_eq!(list_class_dirs(tmp.path()).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_split_parsing() {
        assert_eq!("train".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("eval".parse::<Split>().unwrap(), Split::Eval);
        assert!(matches!(
            "validation".parse::<Split>(),
            Err(UniTrainError::Configuration(_))
        ));
    }
}
