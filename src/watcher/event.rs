use std::path::{Path, PathBuf};

use notify::EventKind;
use notify::event::ModifyKind;

/// What happened to a path, in the watcher's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Write,
    Rename,
    Remove,
    /// Permission or other metadata change. Never triggers a rebuild.
    Chmod,
}

impl Op {
    /// Map a `notify` event kind onto an `Op`. Access and unknown events map to nothing.
    pub fn from_kind(kind: &EventKind) -> Option<Op> {
        match kind {
            EventKind::Create(_) => Some(Op::Create),
            EventKind::Modify(ModifyKind::Name(_)) => Some(Op::Rename),
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(Op::Chmod),
            EventKind::Modify(_) => Some(Op::Write),
            EventKind::Remove(_) => Some(Op::Remove),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }

    /// Content-affecting operations.
    pub fn triggers_rebuild(self) -> bool {
        !matches!(self, Op::Chmod)
    }
}

/// A single classified filesystem change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub op: Op,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, op: Op) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }

    /// True if this event should start (or restart) a rebuild for `root`.
    pub fn qualifies(&self, root: &Path) -> bool {
        self.op.triggers_rebuild() && self.path.starts_with(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Op::from_kind(&EventKind::Create(CreateKind::File)), Some(Op::Create));
        assert_eq!(
            Op::from_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(Op::Write)
        );
        assert_eq!(
            Op::from_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(Op::Rename)
        );
        assert_eq!(
            Op::from_kind(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            Some(Op::Chmod)
        );
        assert_eq!(Op::from_kind(&EventKind::Remove(RemoveKind::File)), Some(Op::Remove));
        assert_eq!(Op::from_kind(&EventKind::Access(AccessKind::Any)), None);
    }

    #[test]
    fn test_chmod_does_not_qualify() {
        let root = Path::new("/project/web");
        assert!(!ChangeEvent::new("/project/web/a.css", Op::Chmod).qualifies(root));
        for op in [Op::Create, Op::Write, Op::Rename, Op::Remove] {
            assert!(ChangeEvent::new("/project/web/a.css", op).qualifies(root));
        }
    }

    #[test]
    fn test_paths_outside_root_do_not_qualify() {
        let root = Path::new("/project/web");
        assert!(!ChangeEvent::new("/project/dist/main.js", Op::Write).qualifies(root));
        assert!(!ChangeEvent::new("/project/website/x.css", Op::Write).qualifies(root));
    }
}
