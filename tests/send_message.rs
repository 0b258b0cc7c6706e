use crux_core::testing::AppTester;

use chat_core::capabilities::{AuthUser, StoreError, StoreOperation, StoreOutput};
use chat_core::event::{MessageId, SecretBytes};
use chat_core::model::{AppState, MessageRecord};
use chat_core::{App, Effect, Event, Model};

fn signed_in(app: &AppTester<App, Effect>) -> Model {
    let mut model = Model::default();

    app.update(
        Event::StorageKeyProvided {
            key: SecretBytes::new(vec![9u8; 32]),
        },
        &mut model,
    );
    app.update(
        Event::NameChanged {
            name: "Ada".into(),
        },
        &mut model,
    );
    app.update(Event::SignInRequested, &mut model);
    app.update(
        Event::AuthResponse(Box::new(Ok(AuthUser {
            user_id: "me".into(),
        }))),
        &mut model,
    );

    assert_eq!(model.state, AppState::Chat);
    model
}

fn store_inserts(effects: &[Effect]) -> Vec<MessageRecord> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Store(req) => match &req.operation {
                StoreOperation::Insert { record, .. } => Some(record.clone()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn pending_id(model: &Model) -> MessageId {
    let mut keys: Vec<_> = model.pending_sends.keys().cloned().collect();
    assert_eq!(keys.len(), 1, "exactly one send should be in flight");
    keys.pop().unwrap()
}

#[test]
fn empty_text_never_reaches_the_store() {
    let app = AppTester::<App, _>::default();
    let mut model = signed_in(&app);

    let update = app.update(
        Event::SendRequested {
            text: String::new(),
        },
        &mut model,
    );

    assert!(store_inserts(&update.effects).is_empty());
    assert!(model.pending_sends.is_empty());
    assert_eq!(
        app.view(&model).notice.as_deref(),
        Some("Please enter a message")
    );
}

#[test]
fn whitespace_only_text_never_reaches_the_store() {
    let app = AppTester::<App, _>::default();
    let mut model = signed_in(&app);

    let update = app.update(
        Event::SendRequested {
            text: "   \t \n ".into(),
        },
        &mut model,
    );

    assert!(store_inserts(&update.effects).is_empty());
    assert_eq!(
        app.view(&model).notice.as_deref(),
        Some("Please enter a message")
    );
}

#[test]
fn overlong_text_never_reaches_the_store() {
    let app = AppTester::<App, _>::default();
    let mut model = signed_in(&app);

    let update = app.update(
        Event::SendRequested {
            text: "x".repeat(201),
        },
        &mut model,
    );

    assert!(store_inserts(&update.effects).is_empty());
    assert_eq!(
        app.view(&model).notice.as_deref(),
        Some("Message is too long! Please keep it under 200 characters.")
    );
}

#[test]
fn text_at_the_bound_is_sent() {
    let app = AppTester::<App, _>::default();
    let mut model = signed_in(&app);

    let update = app.update(
        Event::SendRequested {
            text: "x".repeat(200),
        },
        &mut model,
    );

    assert_eq!(store_inserts(&update.effects).len(), 1);
    assert!(app.view(&model).notice.is_none());
}

#[test]
fn insert_payload_matches_the_store_schema() {
    let app = AppTester::<App, _>::default();
    let mut model = signed_in(&app);

    let update = app.update(
        Event::SendRequested {
            text: "  hello world  ".into(),
        },
        &mut model,
    );

    let records = store_inserts(&update.effects);
    assert_eq!(records.len(), 1);
    let record = &records[0];

    assert_eq!(record.text, "hello world");
    assert_eq!(record.uid, "me");
    assert_eq!(record.name, "Ada");
    assert_eq!(record.user.id, "me");
    assert_eq!(record.user.name, "Ada");
    assert!(record.created_at > 0);
    assert!(record.image.is_none());
    assert!(record.location.is_none());
}

#[test]
fn accepted_send_is_prepended_with_the_store_id() {
    let app = AppTester::<App, _>::default();
    let mut model = signed_in(&app);

    app.update(
        Event::SendRequested {
            text: "hello".into(),
        },
        &mut model,
    );

    let local_id = pending_id(&model);
    assert!(model.messages.is_empty());

    app.update(
        Event::SendResponse {
            local_id,
            result: Box::new(Ok(StoreOutput::Inserted {
                id: "server-1".into(),
            })),
        },
        &mut model,
    );

    assert!(model.pending_sends.is_empty());
    assert_eq!(model.messages.len(), 1);
    assert_eq!(model.messages[0].id.as_str(), "server-1");
    assert_eq!(model.messages[0].text, "hello");
    assert!(model.messages[0].pending);

    let view = app.view(&model);
    let bubble = &view.chat.unwrap().bubbles[0];
    assert!(bubble.is_mine);
    assert!(bubble.pending);
}

#[test]
fn failed_send_alerts_and_is_not_added() {
    let app = AppTester::<App, _>::default();
    let mut model = signed_in(&app);

    app.update(
        Event::SendRequested {
            text: "hello".into(),
        },
        &mut model,
    );
    let local_id = pending_id(&model);

    app.update(
        Event::SendResponse {
            local_id,
            result: Box::new(Err(StoreError::Rejected {
                message: "write denied".into(),
            })),
        },
        &mut model,
    );

    assert!(model.messages.is_empty());
    assert!(model.pending_sends.is_empty());
    assert_eq!(
        app.view(&model).notice.as_deref(),
        Some("Unable to send message. Please try again later.")
    );
}

#[test]
fn sending_while_offline_is_rejected_up_front() {
    let app = AppTester::<App, _>::default();
    let mut model = signed_in(&app);

    app.update(Event::NetworkStatusChanged { online: false }, &mut model);

    let update = app.update(
        Event::SendRequested {
            text: "hello".into(),
        },
        &mut model,
    );

    assert!(store_inserts(&update.effects).is_empty());
    assert!(model.pending_sends.is_empty());
    assert_eq!(
        app.view(&model).notice.as_deref(),
        Some("Unable to connect. Please check your internet connection and try again.")
    );
}

#[test]
fn next_push_supersedes_the_optimistic_entry() {
    let app = AppTester::<App, _>::default();
    let mut model = signed_in(&app);
    let token = model.live_subscription.clone().unwrap();

    app.update(
        Event::SendRequested {
            text: "hello".into(),
        },
        &mut model,
    );
    let local_id = pending_id(&model);
    app.update(
        Event::SendResponse {
            local_id,
            result: Box::new(Ok(StoreOutput::Inserted {
                id: "server-1".into(),
            })),
        },
        &mut model,
    );
    assert!(model.messages[0].pending);

    // The store's next push contains the confirmed copy.
    let confirmed = {
        let mut record = MessageRecord::from(&model.messages[0]);
        record.id = "server-1".into();
        record
    };
    app.update(
        Event::SubscriptionEvent {
            subscription: token.clone(),
            result: Box::new(Ok(StoreOutput::Snapshot {
                subscription: token,
                messages: vec![confirmed],
            })),
        },
        &mut model,
    );

    assert_eq!(model.messages.len(), 1);
    assert_eq!(model.messages[0].id.as_str(), "server-1");
    assert!(!model.messages[0].pending);
}

#[test]
fn notice_is_dismissable() {
    let app = AppTester::<App, _>::default();
    let mut model = signed_in(&app);

    app.update(
        Event::SendRequested {
            text: String::new(),
        },
        &mut model,
    );
    assert!(app.view(&model).notice.is_some());

    app.update(Event::NoticeDismissed, &mut model);
    assert!(app.view(&model).notice.is_none());
}
