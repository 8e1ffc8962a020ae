//! Process tracker (§4.5): the live map of monitored descendants, and the
//! tree-shaped result it freezes into at the end of a run.

use std::collections::HashMap;

use log::warn;

use crate::record::{Bracket, Process, ProcessInstantMetrics};
use crate::Pid;

/// One still-live process, as tracked during a run. Not part of the public
/// result tree — see [`crate::record::Process`] for the frozen form.
#[derive(Debug, Clone)]
pub struct InProgressProcess {
    pub pid: Pid,
    pub command_list: Vec<String>,
    pub discovery_bracket: Bracket,
    pub termination_bracket: Option<Bracket>,
    pub children: Vec<Pid>,
    pub instant_metrics: Vec<ProcessInstantMetrics>,
    /// Set once the sampler has taken its mandatory priming CPU-time read
    /// (§4.6: "the first reading after discovery is discarded").
    pub(crate) cpu_primed: bool,
    pub(crate) prev_cpu_sample: Option<crate::sampler::CpuTimesSample>,
}

impl InProgressProcess {
    fn new(pid: Pid, command_list: Vec<String>, discovery_bracket: Bracket) -> Self {
        InProgressProcess {
            pid,
            command_list,
            discovery_bracket,
            termination_bracket: None,
            children: Vec::new(),
            instant_metrics: Vec::new(),
            cpu_primed: false,
            prev_cpu_sample: None,
        }
    }
}

/// Owns the flat `pid -> InProgressProcess` map and the parent/child chain
/// rooted at the main process.
#[derive(Debug, Default)]
pub struct ProcessTracker {
    monitored: HashMap<Pid, InProgressProcess>,
    main_pid: Option<Pid>,
    finished: HashMap<Pid, InProgressProcess>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        ProcessTracker::default()
    }

    /// Registers the main process itself. Must be called exactly once,
    /// before any call to [`Self::discover`].
    pub fn start(&mut self, pid: Pid, command_list: Vec<String>, discovery_bracket: Bracket) {
        self.main_pid = Some(pid);
        self.monitored.insert(pid, InProgressProcess::new(pid, command_list, discovery_bracket));
    }

    pub fn main_pid(&self) -> Pid {
        self.main_pid.expect("ProcessTracker::start must be called before use")
    }

    pub fn is_monitored(&self, pid: Pid) -> bool {
        self.monitored.contains_key(&pid)
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.monitored.keys().copied().collect()
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut InProgressProcess> {
        self.monitored.get_mut(&pid)
    }

    pub fn get(&self, pid: Pid) -> Option<&InProgressProcess> {
        self.monitored.get(&pid)
    }

    /// Registers a newly observed descendant (§4.5: "Discover"). `parent`
    /// is appended to if it is itself monitored.
    pub fn discover(&mut self, pid: Pid, parent: Option<Pid>, command_list: Vec<String>, discovery_bracket: Bracket) {
        if self.monitored.contains_key(&pid) {
            return;
        }
        self.monitored.insert(pid, InProgressProcess::new(pid, command_list, discovery_bracket));
        if let Some(parent) = parent {
            if let Some(parent_process) = self.monitored.get_mut(&parent) {
                parent_process.children.push(pid);
            }
        }
    }

    /// Removes a pid the OS reports as gone (§4.5: "Drop"). The record is
    /// kept (in `finished`) so it remains reachable through the parent's
    /// children chain when the tree is built.
    pub fn drop_process(&mut self, pid: Pid, termination_bracket: Bracket) {
        if let Some(mut process) = self.monitored.remove(&pid) {
            process.termination_bracket = Some(termination_bracket);
            self.finished.insert(pid, process);
        } else {
            warn!("tracker asked to drop untracked pid {}", pid);
        }
    }

    /// Gives every still-monitored process the current bracket as its
    /// termination window (§4.5: "Finalize") and moves it out of the live
    /// map so the tree can be built.
    pub fn finalize(&mut self, termination_bracket: Bracket) {
        let pids: Vec<Pid> = self.monitored.keys().copied().collect();
        for pid in pids {
            let mut process = self.monitored.remove(&pid).unwrap();
            process.termination_bracket = Some(termination_bracket);
            self.finished.insert(pid, process);
        }
    }

    /// Walks children pointers from the main process and materializes the
    /// immutable result tree. Must be called after [`Self::finalize`].
    pub fn build_tree(&self) -> Process {
        self.build_subtree(self.main_pid())
    }

    fn build_subtree(&self, pid: Pid) -> Process {
        let process = self.finished.get(&pid).expect("finalize() must run before build_tree()");
        Process {
            command_list: process.command_list.clone(),
            pid: process.pid,
            started_between_timestamps: process.discovery_bracket,
            terminated_between_timestamps: process.termination_bracket.expect("finalize() sets every bracket"),
            instant_metrics: process.instant_metrics.clone(),
            children: process.children.iter().map(|&child_pid| self.build_subtree(child_pid)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_registers_with_parent() {
        let mut tracker = ProcessTracker::new();
        tracker.start(1, vec!["main".into()], (0.0, 0.1));
        tracker.discover(2, Some(1), vec!["child".into()], (0.1, 0.2));
        assert_eq!(tracker.get(1).unwrap().children, vec![2]);
        assert!(tracker.is_monitored(2));
    }

    #[test]
    fn rediscovering_same_pid_is_a_noop() {
        let mut tracker = ProcessTracker::new();
        tracker.start(1, vec!["main".into()], (0.0, 0.1));
        tracker.discover(2, Some(1), vec!["child".into()], (0.1, 0.2));
        tracker.discover(2, Some(1), vec!["child".into()], (0.2, 0.3));
        assert_eq!(tracker.get(1).unwrap().children, vec![2]);
    }

    #[test]
    fn tree_has_depth_matching_discovery_chain() {
        let mut tracker = ProcessTracker::new();
        tracker.start(1, vec!["main".into()], (0.0, 0.1));
        tracker.discover(2, Some(1), vec!["child".into()], (0.1, 0.2));
        tracker.discover(3, Some(2), vec!["grandchild".into()], (0.2, 0.3));
        tracker.finalize((1.0, 1.1));
        let tree = tracker.build_tree();
        assert_eq!(tree.pid, 1);
        assert_eq!(tree.children[0].pid, 2);
        assert_eq!(tree.children[0].children[0].pid, 3);
        assert_eq!(tree.terminated_between_timestamps, (1.0, 1.1));
    }

    #[test]
    fn dropped_process_remains_reachable_through_parent() {
        let mut tracker = ProcessTracker::new();
        tracker.start(1, vec!["main".into()], (0.0, 0.1));
        tracker.discover(2, Some(1), vec!["child".into()], (0.1, 0.2));
        tracker.drop_process(2, (0.5, 0.6));
        tracker.finalize((1.0, 1.1));
        let tree = tracker.build_tree();
        assert_eq!(tree.children[0].terminated_between_timestamps, (0.5, 0.6));
    }
}
