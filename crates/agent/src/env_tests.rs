// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn state_dir_prefers_explicit_override() {
    std::env::set_var("DROVER_STATE_DIR", "/srv/drover");
    std::env::set_var("XDG_STATE_HOME", "/xdg");
    assert_eq!(state_dir().unwrap(), PathBuf::from("/srv/drover"));

    std::env::remove_var("DROVER_STATE_DIR");
    assert_eq!(state_dir().unwrap(), PathBuf::from("/xdg/drover-agent"));
    std::env::remove_var("XDG_STATE_HOME");
}

#[test]
#[serial]
fn unset_ack_timeout_waits_forever() {
    std::env::remove_var("DROVER_ACK_TIMEOUT_MS");
    assert_eq!(ack_timeout(), None);

    std::env::set_var("DROVER_ACK_TIMEOUT_MS", "2500");
    assert_eq!(ack_timeout(), Some(Duration::from_millis(2500)));
    std::env::remove_var("DROVER_ACK_TIMEOUT_MS");
}

#[test]
#[serial]
fn unparsable_values_fall_back_to_defaults() {
    std::env::set_var("DROVER_TICK_MS", "soon");
    std::env::set_var("DROVER_UPLOAD_ATTEMPTS", "0");
    std::env::set_var("DROVER_SERVER_URL", "");

    assert_eq!(tick_interval(), Duration::from_secs(10));
    assert_eq!(upload_attempts(), 3);
    assert_eq!(server_url(), "ws://127.0.0.1:8153/agent");

    std::env::remove_var("DROVER_TICK_MS");
    std::env::remove_var("DROVER_UPLOAD_ATTEMPTS");
    std::env::remove_var("DROVER_SERVER_URL");
}
