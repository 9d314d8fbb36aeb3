//! Agent credential specs
//!
//! Verify that an agent's credential binds on first contact and that an
//! impostor with the same uuid is turned away.

use crate::prelude::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_contact_registers_and_sets_a_cookie() {
    let server = Server::start("").await;
    let agent = Agent::start(&server.url);

    agent.tick().await.unwrap();
    agent.until("cookie to arrive", || agent.controller.runtime_record().cookie().is_some()).await;

    let entry = server.coordinator.agent(&agent.uuid()).unwrap();
    assert_eq!(entry.cookie(), agent.controller.runtime_record().cookie());
    assert!(server.coordinator.is_connected(&agent.uuid()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn impostor_with_another_credential_is_refused() {
    let server = Server::start("").await;
    let original = Agent::with_uuid(&server.url, "agent-one");
    original.tick().await.unwrap();

    let impostor = Agent::with_uuid(&server.url, "agent-one");
    assert!(impostor.tick().await.is_err());

    assert!(!impostor.identity.is_registered(), "refused credential is dropped");
    assert!(original.identity.is_registered());
    assert!(server.coordinator.is_connected("agent-one"));
}
