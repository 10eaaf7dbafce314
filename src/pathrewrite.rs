//! Bidirectional translation between the coordinator's canonical prefix
//! (`SHARED_ROOT`) and a worker's local mount prefix (`LOCAL_MOUNT`).
//!
//! Applied at exactly two points: inbound, when a worker receives a
//! task (canonical -> local), and outbound, when it emits a
//! `TaskResult` (local -> canonical). The coordinator never sees local
//! paths; workers never persist canonical paths. Pure string-prefix
//! substitution, a no-op when shared storage is disabled.

#[derive(Debug, Clone)]
pub struct PathRewriter {
    shared_root: String,
    local_mount: String,
    enabled: bool,
}

impl PathRewriter {
    /// Builds a rewriter. Validates that neither prefix contains the
    /// other, since prefix substitution is ambiguous otherwise.
    pub fn new(shared_root: impl Into<String>, local_mount: impl Into<String>, enabled: bool) -> Self {
        let shared_root = shared_root.into();
        let local_mount = local_mount.into();
        if enabled {
            assert!(
                !shared_root.starts_with(&local_mount) && !local_mount.starts_with(&shared_root),
                "SHARED_ROOT and LOCAL_MOUNT must not overlap (shared_root={shared_root}, local_mount={local_mount})"
            );
        }
        Self {
            shared_root,
            local_mount,
            enabled,
        }
    }

    pub fn disabled() -> Self {
        Self {
            shared_root: String::new(),
            local_mount: String::new(),
            enabled: false,
        }
    }
}

impl Default for PathRewriter {
    fn default() -> Self {
        Self::disabled()
    }
}

impl PathRewriter {
    /// Coordinator canonical path -> worker local path.
    pub fn to_local(&self, path: &str) -> String {
        if !self.enabled {
            return path.to_string();
        }
        match path.strip_prefix(&self.shared_root) {
            Some(rest) => format!("{}{}", self.local_mount, rest),
            None => path.to_string(),
        }
    }

    /// Worker local path -> coordinator canonical path.
    pub fn to_canonical(&self, path: &str) -> String {
        if !self.enabled {
            return path.to_string();
        }
        match path.strip_prefix(&self.local_mount) {
            Some(rest) => format!("{}{}", self.shared_root, rest),
            None => path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_both_prefixes() {
        let rw = PathRewriter::new("/shared/gridmr", "/mnt/gridmr", true);
        let canonical = "/shared/gridmr/jobs/j1/intermediate/map/foo.txt";
        let local = rw.to_local(canonical);
        assert_eq!(local, "/mnt/gridmr/jobs/j1/intermediate/map/foo.txt");
        assert_eq!(rw.to_canonical(&local), canonical);
    }

    #[test]
    fn disabled_is_a_no_op() {
        let rw = PathRewriter::disabled();
        let path = "/shared/gridmr/jobs/j1/result.txt";
        assert_eq!(rw.to_local(path), path);
        assert_eq!(rw.to_canonical(path), path);
    }

    #[test]
    fn unrelated_path_passes_through() {
        let rw = PathRewriter::new("/shared/gridmr", "/mnt/gridmr", true);
        let path = "/tmp/scratch.txt";
        assert_eq!(rw.to_local(path), path);
    }

    #[test]
    #[should_panic]
    fn overlapping_prefixes_are_rejected() {
        PathRewriter::new("/mnt", "/mnt/gridmr", true);
    }
}
