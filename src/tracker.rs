use std::rc::Weak;

/// Something whose contents can be dropped in place to break a reference
/// cycle it takes part in.
pub(crate) trait Release {
    fn release(&self);
}

/// Weak handles to every heap object that can close a cycle (closure
/// environments, instances, arrays). Reference counting alone never frees
/// `class -> method -> closure -> class` or `instance -> field -> bound method
/// -> instance`; releasing everything still alive when the interpreter goes
/// away does.
pub(crate) struct Tracker {
    handles: Vec<Weak<dyn Release>>,
    high_water: usize,
}

const MIN_HIGH_WATER: usize = 64;

impl Tracker {
    pub fn new() -> Tracker {
        Tracker {
            handles: Vec::new(),
            high_water: MIN_HIGH_WATER,
        }
    }

    pub fn track(&mut self, handle: Weak<dyn Release>) {
        if let Some(last) = self.handles.last() {
            if last.ptr_eq(&handle) {
                return;
            }
        }
        self.handles.push(handle);
        if self.handles.len() > self.high_water {
            self.handles.retain(|h| h.strong_count() > 0);
            self.high_water = MIN_HIGH_WATER.max(self.handles.len() * 2);
        }
    }

    pub fn live(&self) -> usize {
        self.handles.iter().filter(|h| h.strong_count() > 0).count()
    }

    pub fn release_all(&mut self) {
        for handle in self.handles.drain(..) {
            if let Some(object) = handle.upgrade() {
                object.release();
            }
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tracker_tests {
    use super::{Release, Tracker};
    use std::cell::RefCell;
    use std::rc::{Rc, Weak};

    struct Node {
        next: RefCell<Option<Rc<Node>>>,
    }

    impl Release for Node {
        fn release(&self) {
            let next = self.next.borrow_mut().take();
            drop(next);
        }
    }

    #[test]
    fn releasing_breaks_cycles() {
        let mut tracker = Tracker::new();
        let weak: Weak<Node>;
        {
            let a = Rc::new(Node {
                next: RefCell::new(None),
            });
            *a.next.borrow_mut() = Some(a.clone());
            weak = Rc::downgrade(&a);
            let handle: Weak<dyn Release> = weak.clone();
            tracker.track(handle);
        }
        assert_eq!(weak.strong_count(), 1);
        assert_eq!(tracker.live(), 1);
        tracker.release_all();
        assert_eq!(weak.strong_count(), 0);
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn dead_handles_are_pruned() {
        let mut tracker = Tracker::new();
        for _ in 0..1000 {
            let node = Rc::new(Node {
                next: RefCell::new(None),
            });
            let handle: Weak<dyn Release> = Rc::downgrade(&node) as Weak<Node>;
            tracker.track(handle);
        }
        assert!(tracker.handles.len() <= 2 * super::MIN_HIGH_WATER);
    }
}
