//! The render request queue fed by the graph listener.

use std::{cell::RefCell, collections::VecDeque, rc::Weak};

use log::trace;

use tessera_core::identifier::Id;

use crate::{
    model::{Graph, GraphEvent, ListenerId},
    view::UpdateFlags,
};

/// Work the paper picks up on its next flush.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Request {
    Mount(Id),
    Unmount(Id),
    Update(Id, UpdateFlags),
    Reset,
}

#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    requests: VecDeque<Request>,
}

impl Scheduler {
    pub(crate) fn push(&mut self, request: Request) {
        self.requests.push_back(request);
    }

    pub(crate) fn drain(&mut self) -> Vec<Request> {
        self.requests.drain(..).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Translates a graph event into requests.
    pub(crate) fn observe(&mut self, event: &GraphEvent) {
        match event {
            GraphEvent::Add { id, .. } => self.push(Request::Mount(*id)),
            GraphEvent::Remove { id, .. } => self.push(Request::Unmount(*id)),
            GraphEvent::Change { id, kind, key, .. } => {
                let flags = UpdateFlags::for_attribute(*kind, key);
                if flags.is_empty() {
                    trace!(cell_id = id.to_string(), key = key.as_str(); "Change needs no view work");
                    return;
                }
                self.push(Request::Update(*id, flags));
            }
            GraphEvent::Reset { .. } => {
                self.requests.clear();
                self.push(Request::Reset);
            }
            GraphEvent::BatchStart { .. } | GraphEvent::BatchStop { .. } => {}
        }
    }
}

/// Registers a listener that forwards graph events to `scheduler`.
///
/// The listener only holds a weak reference, so a dropped paper leaves a
/// listener that does nothing.
pub(crate) fn listen(graph: &mut Graph, scheduler: Weak<RefCell<Scheduler>>) -> ListenerId {
    graph.on(move |_graph, event| {
        if let Some(scheduler) = scheduler.upgrade() {
            scheduler.borrow_mut().observe(event);
        }
    })
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use serde_json::json;
    use tessera_core::geometry::{Point, Size};

    use super::*;
    use crate::model::{CellRegistry, Element, Options};

    #[test]
    fn test_events_become_requests() {
        let mut graph = Graph::new(CellRegistry::standard());
        let scheduler = Rc::new(RefCell::new(Scheduler::default()));
        listen(&mut graph, Rc::downgrade(&scheduler));

        let cell = Element::new("standard.Rectangle")
            .with_id("a")
            .with_size(Size::new(10.0, 10.0))
            .build();
        graph.add_cell(cell).unwrap();
        graph
            .set_position("a", Point::new(5.0, 5.0), Options::new())
            .unwrap();
        graph
            .set_attribute("a", "custom", json!(1), Options::new())
            .unwrap();

        let requests = scheduler.borrow_mut().drain();
        assert_eq!(
            requests,
            vec![
                Request::Mount(Id::new("a")),
                Request::Update(Id::new("a"), UpdateFlags::TRANSLATE),
            ]
        );
    }

    #[test]
    fn test_dropped_scheduler_is_ignored() {
        let mut graph = Graph::new(CellRegistry::standard());
        let scheduler = Rc::new(RefCell::new(Scheduler::default()));
        listen(&mut graph, Rc::downgrade(&scheduler));
        drop(scheduler);
        let cell = Element::new("standard.Rectangle").with_id("a").build();
        graph.add_cell(cell).unwrap();
        assert_eq!(graph.listener_count(), 1);
    }
}
