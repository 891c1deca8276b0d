//! Session bootstrap tests: credential adoption, fresh login, key
//! upload, and the post-sync sweep.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use skald_client::{Call, ChatClient, ChatError, Credentials, DeviceId, UserId};
use skald_harness::{PASSWORD, Scenario, USER, eventually};

#[tokio::test]
async fn stored_credentials_skip_the_network_login() {
    let scenario = Scenario::new().unwrap();
    scenario
        .store()
        .save(&Credentials {
            access_token: "tok-stored".to_string(),
            user_id: UserId::new(USER),
            device_id: DeviceId::new("STOREDDEVICE"),
        })
        .unwrap();

    let session = scenario.authenticate().await.unwrap();

    assert_eq!(session.device_id(), &DeviceId::new("STOREDDEVICE"));
    let calls = scenario.client().calls();
    assert!(calls.contains(&Call::Restore));
    assert!(!calls.contains(&Call::Login), "adoption must not hit the network");
}

#[tokio::test]
async fn fresh_login_persists_credentials() {
    let scenario = Scenario::new().unwrap();
    let session = scenario.authenticate().await.unwrap();

    assert!(scenario.client().calls().contains(&Call::Login));

    // A second store over the same path sees the saved record.
    let stored = scenario.store().load().unwrap();
    assert_eq!(&stored.user_id, session.user_id());
    assert_eq!(&stored.device_id, session.device_id());
}

#[tokio::test]
async fn corrupt_credentials_fall_back_to_fresh_login() {
    let scenario = Scenario::new().unwrap();
    std::fs::write(scenario.store().path(), b"{ definitely not json").unwrap();

    scenario.authenticate().await.unwrap();
    assert!(scenario.client().calls().contains(&Call::Login));
}

#[tokio::test]
async fn incomplete_credentials_behave_like_no_file() {
    let scenario = Scenario::new().unwrap();
    std::fs::write(
        scenario.store().path(),
        br#"{"access_token": "tok", "device_id": "STOREDDEVICE"}"#,
    )
    .unwrap();

    scenario.authenticate().await.unwrap();
    assert!(scenario.client().calls().contains(&Call::Login));
}

#[tokio::test]
async fn rejected_login_is_fatal() {
    let scenario = Scenario::new().unwrap();
    scenario.client().reject_logins("M_FORBIDDEN");

    let result = scenario.authenticate().await;
    assert!(matches!(result, Err(ChatError::LoginRejected { .. })));
}

#[tokio::test]
async fn key_upload_runs_exactly_when_pending() {
    let scenario = Scenario::new().unwrap();
    scenario.client().set_should_upload_keys(true);

    let session = scenario.authenticate().await.unwrap();
    scenario.client().complete_first_sync();
    session.after_first_sync().await;

    let uploads = scenario
        .client()
        .calls()
        .iter()
        .filter(|call| matches!(call, Call::UploadKeys))
        .count();
    assert_eq!(uploads, 1);
}

#[tokio::test]
async fn key_upload_is_skipped_when_nothing_is_pending() {
    let scenario = Scenario::new().unwrap();

    let session = scenario.authenticate().await.unwrap();
    scenario.client().complete_first_sync();
    session.after_first_sync().await;

    assert!(!scenario.client().calls().contains(&Call::UploadKeys));
}

#[tokio::test]
async fn empty_room_does_not_abort_the_sweep() {
    let scenario = Scenario::new().unwrap();
    // Sorts before "!ops", so the sweep hits the inconsistent room first.
    scenario.seed_room("!abandoned:example.org", "abandoned", true, &[]);
    scenario.seed_room("!ops:example.org", "ops", true, &["@alice:example.org"]);
    scenario.seed_device("@alice:example.org", "ALICEPHONE");

    let session = scenario.authenticate().await.unwrap();
    scenario.client().complete_first_sync();
    session.after_first_sync().await;

    let alice = UserId::new("@alice:example.org");
    assert_eq!(
        scenario.client().verification_calls(&alice, &DeviceId::new("ALICEPHONE")),
        1,
        "sweep must continue past the empty room"
    );
}

#[tokio::test]
async fn run_drives_the_sweep_and_ends_with_the_sync_loop() {
    let scenario = Scenario::new().unwrap();
    scenario.seed_room("!ops:example.org", "ops", true, &["@alice:example.org"]);
    scenario.seed_device("@alice:example.org", "ALICEPHONE");

    let session = scenario.connect().await.unwrap();
    let task = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.run(Duration::from_millis(5)).await })
    };

    // The first sync completes inside the loop and unblocks the sweep.
    let client = Arc::clone(scenario.client());
    let alice = UserId::new("@alice:example.org");
    assert!(
        eventually(|| {
            client.verification_calls(&alice, &DeviceId::new("ALICEPHONE")) == 1
        })
        .await
    );

    scenario.client().close().await;
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn fatal_sync_error_ends_the_session() {
    let scenario = Scenario::new().unwrap();
    let session = scenario.connect().await.unwrap();

    scenario.client().fail_sync("stream reset by peer");
    let result = session.run(Duration::from_millis(5)).await;

    assert!(matches!(result, Err(ChatError::SyncEnded { .. })));
}

#[tokio::test]
async fn password_is_checked_by_the_scripted_homeserver() {
    // Guards the harness itself: the scripted login only accepts the
    // scenario password.
    let scenario = Scenario::new().unwrap();
    let err = scenario.client().login("wrong").await.unwrap_err();
    assert!(matches!(err, ChatError::LoginRejected { .. }));
    assert!(scenario.client().login(PASSWORD).await.is_ok());
}
