/// The host's channel/object plumbing, consumed only by the Persistence
/// Controller (§6). Everything else that could be treated as an external
/// collaborator — message-tag parsing, timer dispatch, the DB cipher —
/// is fully internalized in this crate (see `SPEC_FULL.md` §4.5a).
pub trait HostObjects: Send + Sync {
    /// Does an object by this name currently exist on the host (e.g. is
    /// there a channel with this name)?
    fn object_exists(&self, name: &str) -> bool;

    /// Does the object still carry the history-persistence mode? A host
    /// with no notion of per-object modes can return `true` unconditionally.
    fn object_has_history_persist_mode(&self, name: &str) -> bool;
}

/// Trivial implementation for hosts (and tests) with no concept of
/// per-object existence checks or modes: everything is assumed persistable.
pub struct AlwaysPresent;

impl HostObjects for AlwaysPresent {
    fn object_exists(&self, _name: &str) -> bool {
        true
    }

    fn object_has_history_persist_mode(&self, _name: &str) -> bool {
        true
    }
}
