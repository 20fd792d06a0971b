//! Archive-wide bookkeeping of an output archive: the time sampling table,
//! every object path written so far and the instance edges between them.

use std::collections::HashSet;

use crate::core::TimeSampling;

/// `path` equals `root` or lies below it.
pub(crate) fn is_within(path: &str, root: &str) -> bool {
    if root == "/" || path == root {
        return true;
    }
    path.strip_prefix(root)
        .is_some_and(|rest| rest.starts_with('/'))
}

pub(crate) struct WriteContext {
    /// Index 0 is always the identity sampling.
    pub time_samplings: Vec<TimeSampling>,
    pub objects: HashSet<String>,
    /// (instance path, target path)
    pub instances: Vec<(String, String)>,
}

impl WriteContext {
    pub fn new() -> Self {
        let mut objects = HashSet::new();
        objects.insert("/".to_string());
        Self {
            time_samplings: vec![TimeSampling::identity()],
            objects,
            instances: Vec::new(),
        }
    }

    /// Index of `ts`, appending it unless an equal sampling is registered.
    pub fn add_time_sampling(&mut self, ts: TimeSampling) -> u32 {
        if let Some(i) = self.time_samplings.iter().position(|t| *t == ts) {
            return i as u32;
        }
        self.time_samplings.push(ts);
        (self.time_samplings.len() - 1) as u32
    }

    /// Whether the subtree at `target`, following instance edges, contains `path`.
    pub fn reaches(&self, target: &str, path: &str) -> bool {
        let mut pending = vec![target.to_string()];
        let mut seen = HashSet::new();
        while let Some(root) = pending.pop() {
            if !seen.insert(root.clone()) {
                continue;
            }
            if is_within(path, &root) {
                return true;
            }
            for (instance, instance_target) in &self.instances {
                if is_within(instance, &root) {
                    pending.push(instance_target.clone());
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_within() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(is_within("/anything", "/"));
        assert!(!is_within("/ab", "/a"));
        assert!(!is_within("/a", "/a/b"));
    }

    #[test]
    fn test_time_sampling_dedup() {
        let mut ctx = WriteContext::new();
        let ts = TimeSampling::uniform(1.0 / 24.0, 0.0).unwrap();
        assert_eq!(ctx.add_time_sampling(ts.clone()), 1);
        assert_eq!(ctx.add_time_sampling(ts), 1);
        assert_eq!(ctx.add_time_sampling(TimeSampling::identity()), 0);
        assert_eq!(ctx.time_samplings.len(), 2);
    }

    #[test]
    fn test_reaches_through_instances() {
        let mut ctx = WriteContext::new();
        ctx.instances.push(("/a/inst".into(), "/b".into()));
        assert!(ctx.reaches("/a", "/b/c"));
        assert!(!ctx.reaches("/b", "/a"));
        assert!(ctx.reaches("/b", "/b"));
    }
}
