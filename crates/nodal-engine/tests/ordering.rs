//! Property tests for real-time execution order.

use std::sync::Arc;

use nodal_core::{Atom, ObjectKind, Path, Properties, Uri, uris};
use nodal_engine::{
    Client, ClientId, Command, Context, Notification, Payload, Pipeline, PutMode,
};
use parking_lot::Mutex;
use proptest::prelude::*;

#[derive(Default)]
struct Order {
    ids: Mutex<Vec<i32>>,
}

impl Client for Order {
    fn id(&self) -> ClientId {
        7
    }
    fn respond_ok(&self, id: i32) {
        self.ids.lock().push(id);
    }
    fn respond_error(&self, id: i32, _message: &str) {
        self.ids.lock().push(id);
    }
    fn notify(&self, _notification: &Notification) {}
}

fn set_name(subject: &str, i: usize) -> Payload {
    Payload::SetProperty {
        subject: Path::new(subject).unwrap(),
        predicate: Uri::from(uris::NAME),
        value: format!("v{i}").as_str().into(),
    }
}

fn put_port(path: &str) -> Payload {
    Payload::Put {
        path: Path::new(path).unwrap(),
        kind: ObjectKind::input(),
        properties: Properties::new().with(uris::VALUE, 0.0_f32),
        mode: PutMode::Create,
    }
}

fn set_value(value: f32) -> Payload {
    Payload::SetProperty {
        subject: Path::new("/level").unwrap(),
        predicate: Uri::from(uris::VALUE),
        value: Atom::Float(value),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Responses come back sorted by execution time, ties in arrival order.
    /// Edits of the root never overtake one staged before them; rejected
    /// commands keep the time they asked for.
    #[test]
    fn executes_in_timestamp_then_arrival_order(
        stamps in prop::collection::vec((0u64..256, any::<bool>()), 1..48)
    ) {
        let context = Context::new();
        let mut pipeline = Pipeline::new(&context, 64, 64);
        let order = Arc::new(Order::default());
        let client: Arc<dyn Client> = order.clone();

        for (i, (stamp, valid)) in stamps.iter().enumerate() {
            let subject = if *valid { "/" } else { "/missing" };
            let command = Command::from_client(&client, i as i32, *stamp, set_name(subject, i));
            pipeline.pre.process(command).unwrap();
        }
        pipeline.processor.run_cycle(256);
        pipeline.post.drain();

        let mut staged_until = 0;
        let mut expected: Vec<(u64, i32)> = stamps
            .iter()
            .enumerate()
            .map(|(i, (stamp, valid))| {
                let at = if *valid {
                    staged_until = staged_until.max(*stamp);
                    staged_until
                } else {
                    *stamp
                };
                (at, i as i32)
            })
            .collect();
        expected.sort_by_key(|(at, _)| *at);
        let expected: Vec<i32> = expected.into_iter().map(|(_, id)| id).collect();

        prop_assert_eq!(order.ids.lock().clone(), expected);
    }

    /// However edits of one port are stamped, the last one staged is what
    /// the port's value and its live property end up holding.
    #[test]
    fn port_value_matches_live_property(
        edits in prop::collection::vec((0u64..512, -1.0f32..1.0), 1..32)
    ) {
        let context = Context::new();
        let mut pipeline = Pipeline::new(&context, 64, 64);
        pipeline.pre.process(Command::new(0, 0, put_port("/level"))).unwrap();
        for (i, (stamp, value)) in edits.iter().enumerate() {
            let command = Command::new(i as i32 + 1, *stamp, set_value(*value));
            pipeline.pre.process(command).unwrap();
        }
        pipeline.processor.run_cycle(512);
        pipeline.post.drain();

        let port = context.store.get(&Path::new("/level").unwrap()).unwrap();
        let last = edits.last().map(|(_, value)| *value).unwrap();
        prop_assert_eq!(port.value(), last);
        let live = port.live_properties();
        prop_assert_eq!(
            live.get(uris::VALUE),
            Some(&Atom::Float(last))
        );
        prop_assert_eq!(
            port.live_properties().generation(),
            port.properties().staged().generation()
        );
    }
}
