//! Integration tests for the dance-floor engine components
//!
//! These tests validate the wire protocol, authentication, movement and
//! round sequencing across crate boundaries, without a live store.

use serde_json::json;
use server::auth::{compute_hmac, verify_hmac};
use server::dance::{next_combination_length, BeatAction, RoundPlanner};
use server::movement::{arrived, step_toward, STEP};
use shared::{Envelope, GameEvent, GameSnapshot, Mark, PlayerStatus, Position};
use std::net::UdpSocket;
use std::time::Duration;

fn signed_envelope(user_id: &str, event: &str, contents: serde_json::Value, secret: &str) -> Envelope {
    Envelope {
        user_id: user_id.to_string(),
        event: event.to_string(),
        hmac: compute_hmac(&contents.to_string(), secret),
        contents,
    }
}

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests the full inbound validation path: decode a raw datagram
    /// payload, validate the envelope, and parse the typed event.
    #[test]
    fn hello_datagram_decodes_and_parses() {
        let raw = br#"{"userId":"u1","event":"hello","contents":"L0","hmac":"00ff"}"#;
        let envelope: Envelope = serde_json::from_slice(raw).unwrap();
        envelope.validate().unwrap();

        assert_eq!(
            envelope.parse_event().unwrap(),
            GameEvent::Hello {
                location_id: "L0".to_string()
            }
        );
    }

    #[test]
    fn all_four_events_parse_to_their_variants() {
        let cases = vec![
            ("hello", json!("L0")),
            ("move", json!({ "latitude": 0.5, "longitude": -0.5 })),
            ("status", json!("idle")),
            ("mark", json!("bad")),
        ];

        for (event, contents) in cases {
            let envelope = signed_envelope("u1", event, contents, "secret");
            envelope.validate().unwrap();
            let parsed = envelope.parse_event().unwrap();
            match (event, parsed) {
                ("hello", GameEvent::Hello { .. }) => {}
                ("move", GameEvent::Move { .. }) => {}
                ("status", GameEvent::Status(PlayerStatus::Idle)) => {}
                ("mark", GameEvent::Mark(Mark::Bad)) => {}
                (event, parsed) => panic!("event {} parsed to {:?}", event, parsed),
            }
        }
    }

    #[test]
    fn junk_payloads_are_rejected_not_panicked() {
        assert!(serde_json::from_slice::<Envelope>(b"not json").is_err());
        assert!(serde_json::from_slice::<Envelope>(b"{}").is_err());

        let unknown = signed_envelope("u1", "teleport", json!("L0"), "secret");
        assert!(unknown.parse_event().is_err());

        let mismatched = signed_envelope("u1", "move", json!("east"), "secret");
        assert!(mismatched.parse_event().is_err());
    }

    /// Snapshots must survive a JSON round-trip so the test client (and
    /// any real client) can decode what the publisher sends.
    #[test]
    fn snapshot_roundtrips_over_the_wire() {
        let snapshot = GameSnapshot {
            players: vec![],
            song: None,
            arrow_combination: Some(vec!["-1".to_string(), "3".to_string()]),
            location_title: "Rooftop".to_string(),
            scores: None,
        };

        let payload = serde_json::to_vec(&snapshot).unwrap();
        let back: GameSnapshot = serde_json::from_slice(&payload).unwrap();
        assert_eq!(back.location_title, "Rooftop");
        assert_eq!(back.arrow_combination.unwrap(), vec!["-1", "3"]);
    }

    /// Tests real UDP datagram transport of an envelope.
    #[test]
    fn udp_envelope_echo() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind server socket");
        let server_addr = server_socket.local_addr().unwrap();

        let server_socket_clone = server_socket.try_clone().unwrap();
        std::thread::spawn(move || {
            let mut buf = [0; 2048];
            if let Ok((size, client_addr)) = server_socket_clone.recv_from(&mut buf) {
                let _ = server_socket_clone.send_to(&buf[..size], client_addr);
            }
        });

        let client_socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind client socket");
        client_socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();

        let envelope = signed_envelope("u1", "mark", json!("perfect"), "secret");
        let payload = serde_json::to_vec(&envelope).unwrap();
        client_socket.send_to(&payload, server_addr).unwrap();

        let mut buf = [0; 2048];
        let (size, _) = client_socket.recv_from(&mut buf).unwrap();
        let received: Envelope = serde_json::from_slice(&buf[..size]).unwrap();
        assert_eq!(received.user_id, "u1");
        assert_eq!(received.parse_event().unwrap(), GameEvent::Mark(Mark::Perfect));
    }
}

/// AUTHENTICATION TESTS
mod auth_tests {
    use super::*;

    #[test]
    fn signed_envelope_verifies_against_its_contents() {
        let envelope = signed_envelope("u1", "hello", json!("L0"), "s3cr3t");
        assert!(verify_hmac(
            &envelope.contents.to_string(),
            "s3cr3t",
            &envelope.hmac
        ));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let envelope = signed_envelope("u1", "hello", json!("L0"), "s3cr3t");
        assert!(!verify_hmac(
            &envelope.contents.to_string(),
            "other",
            &envelope.hmac
        ));
    }

    #[test]
    fn tampered_contents_fail_verification() {
        let envelope = signed_envelope("u1", "hello", json!("L0"), "s3cr3t");
        assert!(!verify_hmac("\"L1\"", "s3cr3t", &envelope.hmac));
    }

    /// Avalanche sanity check: one changed bit anywhere flips the code.
    #[test]
    fn single_bit_flips_change_the_code() {
        let base = compute_hmac("\"L0\"", "secret");
        assert_ne!(base, compute_hmac("\"L1\"", "secret"));
        assert_ne!(base, compute_hmac("\"L0\"", "recret"));
        // And the code is not trivially prefix-stable either.
        assert_ne!(&base[..32], &compute_hmac("\"L1\"", "secret")[..32]);
    }
}

/// MOVEMENT TESTS
mod movement_tests {
    use super::*;

    /// A goal one unit away on one axis is reached exactly after
    /// ceil(1.0 / 0.05) = 20 ticks.
    #[test]
    fn one_unit_walk_takes_twenty_ticks() {
        let goal = Position {
            latitude: 0.0,
            longitude: 1.0,
        };
        let mut current = Position {
            latitude: 0.0,
            longitude: 0.0,
        };

        let mut ticks = 0;
        while current.longitude != 1.0 {
            current = step_toward(current, goal);
            ticks += 1;
            assert!(ticks <= 20, "walk took more than 20 ticks");
            assert!(current.longitude <= 1.0, "axis overshot the goal");
        }
        assert!(ticks <= 20);
        assert_eq!(current.longitude, 1.0);
        assert!(arrived(current, goal));
    }

    #[test]
    fn each_axis_moves_one_step_per_tick() {
        let goal = Position {
            latitude: -2.0,
            longitude: 3.0,
        };
        let next = step_toward(
            Position {
                latitude: 0.0,
                longitude: 0.0,
            },
            goal,
        );
        assert_eq!(next.latitude, -STEP);
        assert_eq!(next.longitude, STEP);
    }
}

/// ROUND SEQUENCING TESTS
mod dance_tests {
    use super::*;
    use server::catalog::{LocationDef, SongDef};

    fn floor() -> LocationDef {
        LocationDef {
            id: "L0".to_string(),
            title: "Main floor".to_string(),
            min_level: 1,
            max_level: 3,
            inversion: false,
        }
    }

    fn track() -> SongDef {
        SongDef {
            id: "s1".to_string(),
            title: "Night Pulse".to_string(),
            bpm: 120,
            onset: 1.0,
            duration: 60.0,
        }
    }

    /// Runs the planner over a full synthetic round and checks the
    /// published lengths cycle strictly within [min, max].
    #[test]
    fn combination_lengths_cycle_over_a_full_round() {
        let mut planner = RoundPlanner::new(&floor(), &track());
        let mut lengths = Vec::new();
        let mut elapsed = 0.0;

        loop {
            let step = planner.step(elapsed);
            elapsed += step.wait.as_secs_f64();
            match step.action {
                BeatAction::PublishCombination { length } => {
                    assert!((1..=3).contains(&length));
                    lengths.push(length);
                }
                BeatAction::FinishRound => break,
                _ => {}
            }
        }

        assert_eq!(lengths[0], 1);
        for pair in lengths.windows(2) {
            let expected = next_combination_length(pair[0], 1, 3);
            assert_eq!(pair[1], expected, "length did not increment-with-wrap");
        }
        // 60 s of song at one 8-beat cycle (16 beats of 0.5 s) each:
        // several full wraps happen.
        assert!(lengths.len() > 4);
    }

    /// One beat cycle is 4 + 6 + 4 + 2 = 16 beat-counts long.
    #[test]
    fn beat_cycle_spans_sixteen_beats() {
        let mut planner = RoundPlanner::new(&floor(), &track());
        planner.step(0.0); // opening combination

        let mut cycle = Duration::ZERO;
        for _ in 0..4 {
            cycle += planner.step(1.0).wait;
        }
        // 120 bpm: one beat-count is 500 ms.
        assert_eq!(cycle, Duration::from_millis(500) * 16);
    }
}

/// SCORING TESTS
mod scoring_tests {
    use super::*;
    use std::collections::HashMap;

    /// The mark→points table, and accumulation across beats within a
    /// round, mirroring what the daemon's score step does to the store.
    #[test]
    fn scores_accumulate_until_reset() {
        let mut scores: HashMap<String, i64> = HashMap::new();
        let beats = vec![
            ("ada", Some(Mark::Perfect)),
            ("ada", Some(Mark::Good)),
            ("ada", None), // no mark submitted: scored as a miss
            ("bob", Some(Mark::Bad)),
        ];

        for (username, submitted) in beats {
            let mark = submitted.unwrap_or(Mark::Miss);
            *scores.entry(username.to_string()).or_insert(0) += mark.points();
        }

        assert_eq!(scores["ada"], 3000);
        assert_eq!(scores["bob"], 500);

        // Round end wipes the map.
        scores.clear();
        assert!(scores.is_empty());
    }

    #[test]
    fn miss_contributes_nothing() {
        assert_eq!(Mark::Miss.points(), 0);
        assert_eq!(Mark::Perfect.points(), 2000);
    }
}
