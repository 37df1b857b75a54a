use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use strata::{activation::Relu, layer::Dense, Network, NetworkConfig};
use tracing::{
    dispatcher,
    field::{Field, Visit},
    span, Dispatch, Event, Metadata, Subscriber,
};

/// Subscriber that keeps every event as `message key=value ...`.
#[derive(Clone, Default)]
struct Collector {
    events: Arc<Mutex<Vec<String>>>,
    next_span: Arc<AtomicU64>,
}

impl Collector {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn contains(&self, needle: &str) -> bool {
        self.events().iter().any(|event| event.contains(needle))
    }
}

struct Line(String);

impl Visit for Line {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0.insert_str(0, &format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

impl Subscriber for Collector {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _span: &span::Attributes<'_>) -> span::Id {
        span::Id::from_u64(self.next_span.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn record(&self, _span: &span::Id, _values: &span::Record<'_>) {}

    fn record_follows_from(&self, _span: &span::Id, _follows: &span::Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut line = Line(String::new());
        event.record(&mut line);
        self.events.lock().unwrap().push(line.0);
    }

    fn enter(&self, _span: &span::Id) {}

    fn exit(&self, _span: &span::Id) {}
}

#[test]
fn events_reach_the_injected_logger_only() {
    let injected = Collector::default();
    let ambient = Collector::default();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params.bin");

    dispatcher::with_default(&Dispatch::new(ambient.clone()), || {
        let config = NetworkConfig::new()
            .with_logger(Dispatch::new(injected.clone()))
            .with_layer(Dense::new(2, Relu));
        let network = Network::new(4, config).unwrap();
        network.report();
        network.save_params(&path).unwrap();
        network.load_params(&path).unwrap();
    });

    assert!(injected.contains("strata ====="));
    assert!(injected.contains("input_dim=4"));
    assert!(injected.contains("stacked layer"));
    assert!(injected.contains("parameter count: 10"));
    assert!(injected.contains("saved parameters"));
    assert!(injected.contains("loaded parameter=\"W_dense1\""));
    assert!(ambient.events().is_empty(), "{:?}", ambient.events());
}

#[test]
fn logger_defaults_to_current_dispatcher() {
    let ambient = Collector::default();
    dispatcher::with_default(&Dispatch::new(ambient.clone()), || {
        Network::new(3, NetworkConfig::new()).unwrap();
    });
    assert!(ambient.contains("strata ====="));
}
