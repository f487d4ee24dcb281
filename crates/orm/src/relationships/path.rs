//! Relation Path Resolver - dotted paths to a deduplicated tree

use crate::error::{ModelError, ModelResult};

/// One relation to load, with the relations to load beneath it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationPathNode {
    pub name: String,
    pub children: Vec<RelationPathNode>,
}

impl RelationPathNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    fn insert(nodes: &mut Vec<RelationPathNode>, segments: &[&str]) {
        let Some((first, rest)) = segments.split_first() else {
            return;
        };

        let index = match nodes.iter().position(|node| node.name == *first) {
            Some(index) => index,
            None => {
                nodes.push(RelationPathNode::new(*first));
                nodes.len() - 1
            }
        };

        Self::insert(&mut nodes[index].children, rest);
    }

    /// Depth of the deepest path below and including this node
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(RelationPathNode::depth).max().unwrap_or(0)
    }
}

/// Parse dotted relation paths into a tree, merging shared prefixes.
///
/// Paths are processed in input order and sibling names are unique.
/// `owner` is only used to name the model in the error for empty segments.
pub fn resolve<S: AsRef<str>>(paths: &[S], owner: &str) -> ModelResult<Vec<RelationPathNode>> {
    let mut roots = Vec::new();
    merge_into(&mut roots, paths, owner)?;
    Ok(roots)
}

/// Merge more paths into an existing tree
pub fn merge_into<S: AsRef<str>>(
    roots: &mut Vec<RelationPathNode>,
    paths: &[S],
    owner: &str,
) -> ModelResult<()> {
    for path in paths {
        let path = path.as_ref();
        let segments: Vec<&str> = path.split('.').map(str::trim).collect();

        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(ModelError::unknown_relation(path, owner));
        }

        RelationPathNode::insert(roots, &segments);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(nodes: &[RelationPathNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_shared_prefixes_merge() {
        let tree = resolve(&["chats", "chats.messages"], "User").unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].name, "chats");
        assert_eq!(names(&tree[0].children), vec!["messages"]);
    }

    #[test]
    fn test_input_order_and_no_duplicates() {
        let tree = resolve(
            &["profile", "chats.messages.author", "chats.members", "profile", "chats.messages"],
            "User",
        )
        .unwrap();

        assert_eq!(names(&tree), vec!["profile", "chats"]);
        assert_eq!(names(&tree[1].children), vec!["messages", "members"]);
        assert_eq!(names(&tree[1].children[0].children), vec!["author"]);
        assert_eq!(tree[1].depth(), 3);
    }

    #[test]
    fn test_empty_segments_rejected() {
        assert!(matches!(
            resolve(&["chats..messages"], "User"),
            Err(ModelError::UnknownRelation { .. })
        ));
        assert!(resolve(&[""], "User").is_err());
    }

    #[test]
    fn test_merge_into_existing_tree() {
        let mut tree = resolve(&["chats"], "User").unwrap();
        merge_into(&mut tree, &["chats.messages", "chats"], "User").unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 1);
    }
}
