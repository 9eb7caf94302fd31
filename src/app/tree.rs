use std::collections::BTreeMap;

/// Directory tree over a flat list of paths, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTree {
    /// Longest directory prefix shared by every path, with trailing `/`.
    /// Empty when there is none.
    pub prefix: String,
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Dir {
        /// Display label; compacted chains read `a/b/c`
        label: String,
        /// Path below the common prefix, used as a stable collapse key
        key: String,
        children: Vec<TreeNode>,
    },
    File {
        name: String,
        /// The original, full path
        path: String,
    },
}

/// One visible line of a flattened tree
#[derive(Debug, Clone, PartialEq)]
pub struct TreeRow<'a> {
    pub depth: usize,
    pub node: &'a TreeNode,
    pub collapsed: bool,
}

#[derive(Default)]
struct DirBuilder<'a> {
    dirs: BTreeMap<&'a str, DirBuilder<'a>>,
    files: BTreeMap<&'a str, &'a str>,
}

impl<'a> DirBuilder<'a> {
    fn insert(&mut self, segments: &[&'a str], path: &'a str) {
        match segments {
            [] => {}
            [name] => {
                self.files.insert(*name, path);
            }
            [dir, rest @ ..] => self.dirs.entry(*dir).or_default().insert(rest, path),
        }
    }

    fn into_nodes(self, parent_key: &str) -> Vec<TreeNode> {
        let mut nodes = Vec::with_capacity(self.dirs.len() + self.files.len());
        for (name, mut dir) in self.dirs {
            let mut label = name.to_string();
            // Fold chains of directories that hold exactly one directory
            while dir.files.is_empty() && dir.dirs.len() == 1 {
                let Some((child_name, child)) = dir.dirs.pop_first() else {
                    break;
                };
                label.push('/');
                label.push_str(child_name);
                dir = child;
            }
            let key = if parent_key.is_empty() {
                label.clone()
            } else {
                format!("{}/{}", parent_key, label)
            };
            let children = dir.into_nodes(&key);
            nodes.push(TreeNode::Dir {
                label,
                key,
                children,
            });
        }
        for (name, path) in self.files {
            nodes.push(TreeNode::File {
                name: name.to_string(),
                path: path.to_string(),
            });
        }
        nodes
    }
}

/// Build a display tree: strip the shared directory prefix, nest by `/`,
/// compact single-child directory chains, directories before files and each
/// sorted by name. Duplicate paths collapse into one leaf.
pub fn build_tree<S: AsRef<str>>(paths: &[S]) -> FileTree {
    let split: Vec<Vec<&str>> = paths
        .iter()
        .map(|p| p.as_ref().split('/').collect())
        .collect();

    let common = match split.first() {
        Some(first) => (0..first.len().saturating_sub(1))
            .take_while(|&i| split.iter().all(|s| i + 1 < s.len() && s[i] == first[i]))
            .count(),
        None => 0,
    };
    let prefix = match split.first() {
        Some(first) if common > 0 => format!("{}/", first[..common].join("/")),
        _ => String::new(),
    };

    let mut root = DirBuilder::default();
    for (segments, path) in split.iter().zip(paths) {
        root.insert(&segments[common..], path.as_ref());
    }

    FileTree {
        prefix,
        nodes: root.into_nodes(""),
    }
}

impl FileTree {
    /// Depth-first rows, skipping the children of collapsed directories
    pub fn rows(&self, is_collapsed: impl Fn(&str) -> bool) -> Vec<TreeRow<'_>> {
        fn walk<'a>(
            nodes: &'a [TreeNode],
            depth: usize,
            is_collapsed: &dyn Fn(&str) -> bool,
            out: &mut Vec<TreeRow<'a>>,
        ) {
            for node in nodes {
                match node {
                    TreeNode::Dir { key, children, .. } => {
                        let collapsed = is_collapsed(key.as_str());
                        out.push(TreeRow {
                            depth,
                            node,
                            collapsed,
                        });
                        if !collapsed {
                            walk(children, depth + 1, is_collapsed, out);
                        }
                    }
                    TreeNode::File { .. } => out.push(TreeRow {
                        depth,
                        node,
                        collapsed: false,
                    }),
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.nodes, 0, &is_collapsed, &mut out);
        out
    }
}
