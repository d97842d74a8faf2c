use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::{unspanned, ErrorKind, ErrorReporting, ExemplarError, SourceContext, ValidationContext};
use crate::harness::{Origin, Registry, SuiteDefaults};
use crate::suite::{self, SuiteFormat};

/// Everything loaded from a set of paths: the examples in load order and the merged
/// `defaults:` blocks.
#[derive(Debug, Default)]
pub struct Loaded {
    pub registry: Registry,
    pub defaults: SuiteDefaults,
    pub files: Vec<PathBuf>,
}

/// Finds suite files under the given paths.
///
/// The discovery process follows this flow:
/// 1. Expand each path: files are taken as given, directories are walked recursively
/// 2. Keep `.yaml`, `.yml`, `.json` and `.md` files
/// 3. Sort each directory's files so execution order never depends on the filesystem
#[derive(Debug)]
pub struct SuiteDiscoverer;

impl SuiteDiscoverer {
    // =====================
    // Public API - File Discovery
    // =====================

    /// Recursively scans `root` for suite files, sorted.
    pub fn discover_suite_files<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>, ExemplarError> {
        let root = root.as_ref();
        if !root.exists() {
            return Err(io_error(root, "no such file or directory"));
        }
        if root.is_file() {
            return Ok(vec![root.to_path_buf()]);
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| io_error(root, &format!("failed to walk directory: {}", e)))?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if SuiteFormat::from_path(path).is_none() {
                continue;
            }

            files.push(path.to_path_buf());
        }
        files.sort();
        debug!(root = %root.display(), files = files.len(), "discovered suite files");
        Ok(files)
    }

    /// Loads every suite under `paths` into one registry.
    ///
    /// An identifier defined twice, in one file or across files, is a `DuplicateIdentifier`
    /// error reported at the second definition and naming the first.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Loaded, ExemplarError> {
        let mut loaded = Loaded::default();
        for path in paths {
            for file in Self::discover_suite_files(path)? {
                let suite = suite::load_file(&file)?;
                loaded.defaults.merge(&suite.defaults);
                for example in suite.examples {
                    if let Ok(first) = loaded.registry.get(&example.id) {
                        return Err(duplicate_error(&file, &example.id, first.origin.as_ref(), example.origin.as_ref()));
                    }
                    loaded.registry.register_example(example)?;
                }
                loaded.files.push(file);
            }
        }
        info!(
            files = loaded.files.len(),
            examples = loaded.registry.len(),
            "loaded examples"
        );
        Ok(loaded)
    }
}

// =====================
// Internal - Error Construction
// =====================

fn io_error(path: &Path, message: &str) -> ExemplarError {
    ValidationContext::new(SourceContext::fallback(&path.display().to_string()), "discovery").report(
        ErrorKind::Io {
            path: path.display().to_string(),
            message: message.to_string(),
        },
        unspanned(),
    )
}

/// Points at the second definition inside its own file.
fn duplicate_error(
    file: &Path,
    id: &str,
    first: Option<&Origin>,
    second: Option<&Origin>,
) -> ExemplarError {
    let content = std::fs::read_to_string(file).unwrap_or_default();
    let context = ValidationContext::new(SourceContext::from_file(file.display().to_string(), content), "discovery");
    let span = second.map_or_else(unspanned, |origin| context.source.line_span(origin.line));
    context
        .report(
            ErrorKind::DuplicateIdentifier {
                id: id.to_string(),
                original: first.map(ToString::to_string),
            },
            span,
        )
        .with_help("example ids are shared by every suite file in a run; rename one of them")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn discovery_is_recursive_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.yaml", "examples: []\n");
        write(dir.path(), "a/guide.md", "# nothing\n");
        write(dir.path(), "notes.txt", "ignored\n");
        write(dir.path(), "c.json", "{}\n");

        let files = SuiteDiscoverer::discover_suite_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a/guide.md", "b.yaml", "c.json"]);
    }

    #[test]
    fn missing_paths_are_io_errors() {
        let error = SuiteDiscoverer::discover_suite_files("no/such/dir").unwrap_err();
        assert!(matches!(error.kind, ErrorKind::Io { .. }));
    }

    #[test]
    fn duplicates_across_files_name_both_origins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "examples:\n  - id: sum\n    source: console.log(3)\n    expected: ['3']\n");
        write(dir.path(), "b.yaml", "examples:\n  - id: other\n    source: ''\n  - id: sum\n    source: ''\n");

        let error = SuiteDiscoverer::load(&[dir.path()]).unwrap_err();
        assert!(matches!(error.kind, ErrorKind::DuplicateIdentifier { ref id, .. } if id == "sum"));
        let message = error.to_string();
        assert!(message.contains("a.yaml:2"), "{}", message);
        assert!(error.source_info.source.name().ends_with("b.yaml"));
        let help = miette::Diagnostic::help(&error).map(|h| h.to_string());
        assert!(help.is_some_and(|h| h.contains("rename")));
    }

    #[test]
    fn defaults_merge_in_load_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "defaults:\n  timeout_ms: 100\n  seed: 7\nexamples: []\n");
        write(dir.path(), "b.yaml", "defaults:\n  timeout_ms: 300\nexamples: []\n");

        let loaded = SuiteDiscoverer::load(&[dir.path()]).unwrap();
        assert_eq!(loaded.defaults.timeout_ms, Some(300));
        assert_eq!(loaded.defaults.seed, Some(7));
        assert_eq!(loaded.files.len(), 2);
    }
}
