// ABOUTME: Breadth-first filesystem walk that turns a BaseFolder into a set of git-repository Projects
// ABOUTME: Prunes hidden directories (except the agents directory), never follows symlinks outside the BaseFolder, and caps traversal depth

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Markdown files under this directory name, relative to a project root,
/// are candidate Agents. Fixed rather than per-`BaseFolder`-configurable —
/// Fixed rather than per-`BaseFolder`-configurable; no HTTP contract
/// exposes it as a per-folder setting.
pub const AGENTS_DIR_NAME: &str = "agents";

/// Generous default traversal depth, chosen to avoid runaway symlink loops
/// without capping real-world repository layouts.
pub const MAX_SCAN_DEPTH: u32 = 12;

/// One discovered repository root, relative to the scan's `BaseFolder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredProject {
    /// Repository directory name (the last path component).
    pub name: String,
    /// Absolute path to the repository root.
    pub absolute_path: PathBuf,
}

fn is_hidden(entry_name: &str) -> bool {
    entry_name.starts_with('.') && entry_name != AGENTS_DIR_NAME
}

/// Walk `root` breadth-first, pruning hidden directories (other than
/// [`AGENTS_DIR_NAME`]) and any symlink that resolves outside `root`. A
/// directory containing a `.git` subdirectory is recorded as a project and
/// is not itself descended into further (nested repositories are out of
/// scope — the first `.git` found along a path wins).
#[must_use]
pub fn scan_base_folder(root: &Path) -> Vec<DiscoveredProject> {
    let Ok(canonical_root) = std::fs::canonicalize(root) else {
        tracing::warn!(path = %root.display(), "base folder is not accessible, skipping scan");
        return Vec::new();
    };

    let mut projects = Vec::new();
    let mut queue: VecDeque<(PathBuf, u32)> = VecDeque::new();
    queue.push_back((canonical_root.clone(), 0));

    while let Some((dir, depth)) = queue.pop_front() {
        if depth > MAX_SCAN_DEPTH {
            continue;
        }

        if dir.join(".git").is_dir() {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| dir.to_string_lossy().into_owned());
            projects.push(DiscoveredProject {
                name,
                absolute_path: dir,
            });
            continue;
        }

        let Ok(read_dir) = std::fs::read_dir(&dir) else {
            continue;
        };

        for entry in read_dir.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let entry_name = entry.file_name().to_string_lossy().into_owned();

            if file_type.is_symlink() {
                let Ok(resolved) = std::fs::canonicalize(entry.path()) else {
                    continue;
                };
                if !resolved.starts_with(&canonical_root) {
                    continue;
                }
                if resolved.is_dir() && !is_hidden(&entry_name) {
                    queue.push_back((resolved, depth + 1));
                }
                continue;
            }

            if file_type.is_dir() && !is_hidden(&entry_name) {
                queue.push_back((entry.path(), depth + 1));
            }
        }
    }

    projects
}

/// Recursively list every `*.md` file under `project_root`'s agents
/// directory ([`AGENTS_DIR_NAME`]), returned as paths relative to
/// `project_root`. Hidden directories are pruned the same way the outer
/// scan prunes them.
#[must_use]
pub fn scan_agent_files(project_root: &Path) -> Vec<PathBuf> {
    let agents_dir = project_root.join(AGENTS_DIR_NAME);
    let mut found = Vec::new();
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(agents_dir.clone());

    while let Some(dir) = queue.pop_front() {
        let Ok(read_dir) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in read_dir.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            let entry_name = entry.file_name().to_string_lossy().into_owned();
            if file_type.is_dir() {
                if !is_hidden(&entry_name) {
                    queue.push_back(path);
                }
            } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
                if let Ok(relative) = path.strip_prefix(project_root) {
                    found.push(relative.to_path_buf());
                }
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_repo(root: &Path, rel: &str) {
        let repo = root.join(rel);
        fs::create_dir_all(repo.join(".git")).expect("create .git");
        fs::create_dir_all(repo.join(AGENTS_DIR_NAME)).expect("create agents dir");
    }

    #[test]
    fn finds_a_git_repository_nested_under_plain_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        make_repo(dir.path(), "teams/backend/service-a");

        let found = scan_base_folder(dir.path());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "service-a");
    }

    #[test]
    fn prunes_hidden_directories_other_than_the_agents_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        make_repo(dir.path(), ".hidden/service-a");

        let found = scan_base_folder(dir.path());
        assert!(found.is_empty());
    }

    #[test]
    fn does_not_descend_into_an_already_discovered_repository() {
        let dir = tempfile::tempdir().expect("tempdir");
        make_repo(dir.path(), "outer");
        make_repo(dir.path(), "outer/nested");

        let found = scan_base_folder(dir.path());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "outer");
    }

    #[test]
    fn finds_markdown_agent_files_nested_under_the_agents_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let agents_dir = dir.path().join(AGENTS_DIR_NAME).join("team");
        fs::create_dir_all(&agents_dir).expect("create nested agents dir");
        fs::write(agents_dir.join("reviewer.md"), "---\nname: x\n---\n").expect("write agent file");
        fs::write(dir.path().join(AGENTS_DIR_NAME).join("notes.txt"), "ignored").expect("write notes");

        let found = scan_agent_files(dir.path());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], PathBuf::from(AGENTS_DIR_NAME).join("team").join("reviewer.md"));
    }

    #[test]
    fn missing_base_folder_yields_an_empty_scan_without_panicking() {
        let found = scan_base_folder(Path::new("/nonexistent/path/for/hub/scanner/test"));
        assert!(found.is_empty());
    }
}
