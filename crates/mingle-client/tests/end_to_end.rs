//! Two devices talking through one local backend.

use std::sync::Arc;
use std::time::Duration;

use mingle_client::commands::{chats, invitations, messaging, push};
use mingle_client::screens::{ChatListScreen, ThreadScreen, ThreadStatus, UserStatus};
use mingle_client::{AppState, ChannelSink, ClientConfig, Services, UiEvent};
use mingle_store::LocalBackend;
use tokio::sync::mpsc::UnboundedReceiver;

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn device(backend: &Arc<LocalBackend>, name: &str) -> (Arc<AppState>, UnboundedReceiver<UiEvent>) {
    let (sink, events) = ChannelSink::channel();
    let config = ClientConfig {
        reconnect_base: Duration::from_millis(10),
        reconnect_max: Duration::from_millis(50),
        ..ClientConfig::default()
    };
    let state = AppState::new(Services::local_device(backend.clone()), config, sink);
    state.start().await.unwrap();
    state
        .session
        .sign_up(&format!("{name}@mingle.test"), "secret-pw", name)
        .await
        .unwrap();
    (state, events)
}

fn drain(events: &mut UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn first_message_in_a_new_chat_shows_once() {
    let backend = Arc::new(LocalBackend::in_memory().unwrap());
    let (ada, _events) = device(&backend, "ada").await;

    let team = chats::create_chat(&ada, "Team", true).await.unwrap();
    let thread = ThreadScreen::mount(ada.clone(), team.id).await.unwrap();
    assert!(thread.messages().is_empty());

    thread.send_text("hi").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let messages = thread.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "hi");
}

#[tokio::test]
async fn invite_join_chat_and_react() {
    let backend = Arc::new(LocalBackend::in_memory().unwrap());
    let (ada, mut ada_events) = device(&backend, "ada").await;
    let (bob, _bob_events) = device(&backend, "bob").await;

    let team = chats::create_chat(&ada, "Team", true).await.unwrap();
    invitations::invite_by_email(&ada, team.id, "bob@mingle.test")
        .await
        .unwrap();

    let bob_list = ChatListScreen::mount(bob.clone()).await.unwrap();
    assert!(bob_list.chats().is_empty());

    let link = invitations::invite_link(&ada, team.id);
    invitations::join_via_link(&bob, &link).await.unwrap();
    eventually(|| bob_list.chats().iter().any(|c| c.id == team.id)).await;

    let ada_thread = ThreadScreen::mount(ada.clone(), team.id).await.unwrap();
    let bob_thread = ThreadScreen::mount(bob.clone(), team.id).await.unwrap();

    let hello = bob_thread.send_text("hello team").await.unwrap();
    eventually(|| ada_thread.messages().iter().any(|m| m.id == hello.id)).await;

    ada_thread.toggle_reaction(hello.id, "👍").await.unwrap();
    bob_thread.toggle_reaction(hello.id, "👍").await.unwrap();
    eventually(|| {
        bob_thread
            .reaction_summaries()
            .get(&hello.id)
            .is_some_and(|s| s[0].count == 2 && s[0].viewer_has_reacted)
    })
    .await;
    let names = &bob_thread.reaction_summaries()[&hello.id][0].reactor_names;
    assert!(names.contains(&"ada".to_string()));
    assert!(names.contains(&"bob".to_string()));

    // Ada has the thread open, so a push for it is swallowed.
    drain(&mut ada_events);
    assert!(!push::handle_foreground_notification(&ada, team.id, "bob in Team", "hello team"));
    assert!(drain(&mut ada_events)
        .iter()
        .all(|e| !matches!(e, UiEvent::Notification { .. })));

    let status = UserStatus::observe(ada.clone(), bob.viewer().unwrap()).await.unwrap();
    eventually(|| status.is_online()).await;
}

#[tokio::test]
async fn deleting_a_chat_closes_every_view_of_it() {
    let backend = Arc::new(LocalBackend::in_memory().unwrap());
    let (ada, _) = device(&backend, "ada").await;
    let (bob, mut bob_events) = device(&backend, "bob").await;

    let team = chats::create_chat(&ada, "Team", true).await.unwrap();
    invitations::join_via_invite(&bob, team.id).await.unwrap();

    let bob_list = ChatListScreen::mount(bob.clone()).await.unwrap();
    let bob_thread = ThreadScreen::mount(bob.clone(), team.id).await.unwrap();
    assert_eq!(bob_list.chats().len(), 1);

    chats::delete_chat(&ada, team.id).await.unwrap();

    eventually(|| bob_thread.status() == ThreadStatus::ChatDeleted).await;
    eventually(|| bob_list.chats().is_empty()).await;
    assert!(drain(&mut bob_events).contains(&UiEvent::ChatDeleted { chat_id: team.id }));

    assert!(messaging::send_message(&bob, team.id, "anyone?", None)
        .await
        .is_err());
}

#[tokio::test]
async fn thread_recovers_after_a_dropped_connection() {
    let backend = Arc::new(LocalBackend::in_memory().unwrap());
    let (ada, _) = device(&backend, "ada").await;
    let (bob, _) = device(&backend, "bob").await;

    let team = chats::create_chat(&ada, "Team", true).await.unwrap();
    invitations::join_via_invite(&bob, team.id).await.unwrap();
    let ada_thread = ThreadScreen::mount(ada.clone(), team.id).await.unwrap();

    backend.disconnect_subscribers();
    messaging::send_message(&bob, team.id, "sent during the outage", None)
        .await
        .unwrap();

    // The resubscribe triggers a refetch that picks up the missed row.
    eventually(|| {
        ada_thread
            .messages()
            .iter()
            .any(|m| m.content == "sent during the outage")
    })
    .await;

    messaging::send_message(&bob, team.id, "after", None).await.unwrap();
    eventually(|| ada_thread.messages().len() == 2).await;
}
