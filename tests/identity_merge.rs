mod common;

use std::sync::Arc;

use stoicpath::{
    auth::{google::OAuthProfile, services::login_oauth},
    error::AppError,
    memory::MemoryStore,
    users::{
        directory::{SaveOutcome, UserDirectory},
        model::User,
    },
};

use common::TestApp;

fn google(first: &str, email: &str, sub: &str) -> User {
    User::new_google(first.into(), "Stoa".into(), email, sub, None)
}

#[tokio::test]
async fn resaving_by_external_id_keeps_the_stored_id() {
    let store = MemoryStore::new();
    let first = store.save(google("Zeno", "zeno@example.com", "g-1")).await.unwrap();
    let again = store
        .save(google("Zenón", "zeno.new@example.com", "g-1"))
        .await
        .unwrap();

    assert_eq!(again.outcome, SaveOutcome::LinkedByExternalId);
    assert_eq!(again.user.id, first.user.id);
    assert_eq!(again.user.first_name, "Zenón");
    assert_eq!(again.user.email, "zeno.new@example.com");
    assert_eq!(store.user_count().await, 1);
}

#[tokio::test]
async fn linking_cannot_steal_another_rows_email() {
    let store = MemoryStore::new();
    store.save(google("Zeno", "zeno@example.com", "g-1")).await.unwrap();
    let mut other = User::new_local("Ariston", "Quios", "ariston@example.com", "h".into());
    other.email_verified = false;
    store.save(other).await.unwrap();

    let err = store
        .save(google("Zeno", "ariston@example.com", "g-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EmailAlreadyRegistered));
    assert_eq!(store.user_count().await, 2);
}

#[tokio::test]
async fn verified_email_is_never_taken_over() {
    let store = MemoryStore::new();
    let mut owner = User::new_local("Diogenes", "Sinope", "d@example.com", "h".into());
    owner.email_verified = true;
    store.save(owner).await.unwrap();

    let squatter = User::new_local("Otro", "Alguien", "d@example.com", "h2".into());
    assert!(matches!(
        store.save(squatter).await,
        Err(AppError::EmailAlreadyRegistered)
    ));
}

#[tokio::test]
async fn unverified_email_is_claimed_in_place() {
    let store = MemoryStore::new();
    let pending = User::new_local("Panecio", "Rodas", "p@example.com", "old".into());
    let pending_id = pending.id;
    store.save(pending).await.unwrap();

    let saved = store
        .save(User::new_local("Panecio", "Rodas", "p@example.com", "new".into()))
        .await
        .unwrap();
    assert_eq!(saved.outcome, SaveOutcome::LinkedByEmail);
    assert_eq!(saved.user.id, pending_id);
    assert_eq!(saved.user.password_hash.as_deref(), Some("new"));
}

#[tokio::test]
async fn save_by_id_preserves_points() {
    let store = MemoryStore::new();
    let user = store
        .save(google("Cleantes", "c@example.com", "g-7"))
        .await
        .unwrap()
        .user;
    store.set_points(user.id, 42).await;

    let mut edited = user.clone();
    edited.stoic_points = 0;
    edited.first_name = "Cleanthes".into();
    let saved = store.save(edited).await.unwrap();
    assert_eq!(saved.outcome, SaveOutcome::Updated);
    assert_eq!(saved.user.stoic_points, 42);
}

#[tokio::test]
async fn concurrent_first_logins_create_one_user() {
    let app = TestApp::new();
    let state = Arc::new(app.state.clone());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let state = state.clone();
            tokio::spawn(async move {
                login_oauth(
                    &state,
                    OAuthProfile {
                        provider_user_id: "g-race".into(),
                        email: "race@example.com".into(),
                        display_name: Some("Posidonio Apamea".into()),
                        avatar_url: None,
                    },
                )
                .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    let mut created = 0;
    for t in tasks {
        let login = t.await.unwrap().unwrap();
        if login.is_new_user {
            created += 1;
        }
        ids.push(login.user.id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(created, 1);
    assert_eq!(app.store.user_count().await, 1);
}
