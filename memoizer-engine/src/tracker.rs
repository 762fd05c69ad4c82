//! Call-graph tracker.
//!
//! Every memoized evaluation that misses the cache pushes a frame onto a
//! per-thread stack. Nested memoized calls register themselves as children
//! of the frame on top, and nested evaluations add their wall time to it, so
//! the parent can report self time (its wall time minus its children's).

use std::cell::RefCell;
use std::marker::PhantomData;

use chrono::{NaiveDateTime, TimeDelta};
use memoizer_core::NodeId;

/// Timing of one nested evaluation, recorded in its parent's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildTiming {
    pub node_id: NodeId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub wall: TimeDelta,
}

/// An evaluation in flight.
#[derive(Debug)]
struct Frame {
    node_id: NodeId,
    /// First-seen order, no duplicates.
    children: Vec<NodeId>,
    timings: Vec<ChildTiming>,
}

/// What a frame collected by the time its evaluation returned.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedFrame {
    pub node_id: NodeId,
    pub children: Vec<NodeId>,
    pub timings: Vec<ChildTiming>,
}

impl CompletedFrame {
    /// Sum of the wall time of nested evaluations.
    pub fn children_wall(&self) -> TimeDelta {
        self.timings
            .iter()
            .fold(TimeDelta::zero(), |total, timing| total + timing.wall)
    }
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Register `node_id` as a child of the evaluation in flight, if any.
pub fn record_child(node_id: &NodeId) {
    FRAMES.with(|frames| {
        if let Some(frame) = frames.borrow_mut().last_mut() {
            if !frame.children.contains(node_id) {
                frame.children.push(node_id.clone());
            }
        }
    });
}

/// Record a finished nested evaluation in the frame now on top, if any.
pub fn record_timing(timing: ChildTiming) {
    FRAMES.with(|frames| {
        if let Some(frame) = frames.borrow_mut().last_mut() {
            frame.timings.push(timing);
        }
    });
}

/// Push a frame for `node_id`. The frame is popped when the guard finishes
/// or drops.
pub fn push_frame(node_id: NodeId) -> FrameGuard {
    let depth = FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        frames.push(Frame {
            node_id,
            children: Vec::new(),
            timings: Vec::new(),
        });
        frames.len()
    });
    FrameGuard {
        depth,
        done: false,
        _not_send: PhantomData,
    }
}

/// Node identity of the evaluation in flight.
pub fn current_node() -> Option<NodeId> {
    FRAMES.with(|frames| frames.borrow().last().map(|frame| frame.node_id.clone()))
}

/// Number of evaluations in flight on this thread.
pub fn depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}

/// Owns one frame of the stack.
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct FrameGuard {
    depth: usize,
    done: bool,
    _not_send: PhantomData<*const ()>,
}

impl FrameGuard {
    /// Pop the frame and return what it collected.
    pub fn finish(mut self) -> Option<CompletedFrame> {
        self.done = true;
        let depth = self.depth;
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            if frames.len() < depth {
                return None;
            }
            frames.truncate(depth);
            frames.pop().map(|frame| CompletedFrame {
                node_id: frame.node_id,
                children: frame.children,
                timings: frame.timings,
            })
        })
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let depth = self.depth;
        let _ = FRAMES.try_with(|frames| {
            frames.borrow_mut().truncate(depth - 1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, second)
            .unwrap()
    }

    #[test]
    fn test_children_dedup_in_first_seen_order() {
        let guard = push_frame(NodeId::from_raw("m.parent()@2024-01-01"));
        let a = NodeId::from_raw("m.a()@2024-01-01");
        let b = NodeId::from_raw("m.b()@2024-01-01");
        record_child(&b);
        record_child(&a);
        record_child(&b);
        let frame = guard.finish().unwrap();
        assert_eq!(frame.children, vec![b, a]);
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_record_without_frame_is_ignored() {
        record_child(&NodeId::from_raw("m.a()@2024-01-01"));
        record_timing(ChildTiming {
            node_id: NodeId::from_raw("m.a()@2024-01-01"),
            start: at(0),
            end: at(1),
            wall: TimeDelta::seconds(1),
        });
        assert_eq!(depth(), 0);
        assert_eq!(current_node(), None);
    }

    #[test]
    fn test_children_wall_sums_timings() {
        let guard = push_frame(NodeId::from_raw("m.p()@2024-01-01"));
        for (n, secs) in [(1, 2), (2, 3)] {
            record_timing(ChildTiming {
                node_id: NodeId::from_raw(format!("m.c({})@2024-01-01", n)),
                start: at(0),
                end: at(secs),
                wall: TimeDelta::seconds(secs as i64),
            });
        }
        let frame = guard.finish().unwrap();
        assert_eq!(frame.children_wall(), TimeDelta::seconds(5));
    }

    #[test]
    fn test_dropped_guard_pops_frame() {
        {
            let _outer = push_frame(NodeId::from_raw("m.outer()@2024-01-01"));
            let _inner = push_frame(NodeId::from_raw("m.inner()@2024-01-01"));
            assert_eq!(depth(), 2);
            assert_eq!(
                current_node(),
                Some(NodeId::from_raw("m.inner()@2024-01-01"))
            );
        }
        assert_eq!(depth(), 0);
    }
}
