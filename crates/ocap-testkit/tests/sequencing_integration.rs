use anyhow::Result;
use ocap_comms::{CommsConfig, CommsError, Resolution};
use ocap_testkit::TestComms;
use ocap_testkit::fixtures::{data, kernel_object};
use serde_json::json;

mod helpers;
use helpers::{alice_with_egress, exported_promise, rslot};

#[test]
fn in_order_units_are_accepted_and_replays_are_fatal() -> Result<()> {
    let (mut tc, alice) = alice_with_egress()?;

    for seq in 1..=3 {
        tc.receive(&alice, &format!("{seq}::deliver:o+5:bar:;{{}}"))?;
    }
    assert_eq!(tc.drain_kernel().len(), 3);

    let err = tc.receive(&alice, "2::deliver:o+5:bar:;{}").unwrap_err();
    assert!(
        matches!(&err, CommsError::SequenceError { expected: 4, found, .. } if found == "2"),
        "{err}"
    );
    assert!(tc.drain_kernel().is_empty());
    Ok(())
}

#[test]
fn gaps_are_fatal() -> Result<()> {
    let (mut tc, alice) = alice_with_egress()?;
    let err = tc.receive(&alice, "2::deliver:o+5:bar:;{}").unwrap_err();
    assert!(matches!(err, CommsError::SequenceError { expected: 1, .. }));
    Ok(())
}

#[test]
fn unordered_units_still_advance_the_counter() -> Result<()> {
    let (mut tc, alice) = alice_with_egress()?;

    tc.receive(&alice, "::deliver:o+5:bar:;{}")?;
    tc.receive(&alice, "2::deliver:o+5:bar:;{}")?;
    assert_eq!(
        tc.comms.state().remote(&alice).expect("alice").last_received_seq(),
        2
    );
    Ok(())
}

#[test]
fn unordered_units_can_be_refused() -> Result<()> {
    let mut tc = TestComms::with_config(CommsConfig {
        accept_unordered: false,
        ..CommsConfig::default()
    });
    let alice = tc.add_remote("alice")?;
    tc.comms.add_egress(&alice, 5, kernel_object(1))?;

    let err = tc.receive(&alice, "::deliver:o+5:bar:;{}").unwrap_err();
    assert!(matches!(err, CommsError::UnorderedRejected(name) if name == "alice"));
    assert!(tc.drain_kernel().is_empty());
    Ok(())
}

#[test]
fn malformed_envelopes_are_fatal() -> Result<()> {
    let (mut tc, alice) = alice_with_egress()?;
    for bad in ["deliver:o+5:bar:;{}", "1:x:deliver:o+5:bar:;{}", "1::deliver:o+5:bar:"] {
        let err = tc.receive(&alice, bad).unwrap_err();
        assert!(matches!(err, CommsError::MalformedMessage(_)), "{bad}: {err}");
    }
    Ok(())
}

#[test]
fn outbound_units_carry_sequence_and_ack() -> Result<()> {
    let (mut tc, alice) = alice_with_egress()?;
    tc.receive(&alice, "1::deliver:o+5:bar:rp+2;{}")?;
    tc.receive(&alice, "2::deliver:o+5:bar:rp+3;{}")?;

    tc.comms.resolve_from_kernel(vec![Resolution::fulfilled(
        exported_promise(2),
        data(json!("b")),
    )])?;
    tc.comms.resolve_from_kernel(vec![Resolution::fulfilled(
        exported_promise(1),
        data(json!("a")),
    )])?;

    assert_eq!(
        tc.drain_wire(),
        vec![
            "1:2:resolve:fulfill:rp-3;\"b\"".to_string(),
            "2:2:resolve:fulfill:rp-2;\"a\"".to_string(),
        ]
    );
    assert_eq!(tc.comms.state().remote(&alice).expect("alice").next_send_seq(), 3);
    Ok(())
}

/// A promise ID resolved toward the peer in unit `S` stays resolvable
/// inbound until the peer acknowledges `S`.
#[test]
fn retirement_waits_for_acknowledgment() -> Result<()> {
    let (mut tc, alice) = alice_with_egress()?;
    tc.receive(&alice, "1::deliver:o+5:bar:rp+2;{}")?;
    tc.comms.resolve_from_kernel(vec![Resolution::fulfilled(
        exported_promise(1),
        data(json!(7)),
    )])?;
    assert_eq!(tc.drain_wire(), vec!["1:1:resolve:fulfill:rp-2;7".to_string()]);

    let pending = |tc: &TestComms| {
        tc.comms
            .state()
            .remote(&alice)
            .expect("alice")
            .pending_retirements()
            .map(|p| (p.sent_seq, p.promise))
            .collect::<Vec<_>>()
    };
    assert_eq!(pending(&tc), vec![(1, rslot("rp+2"))]);

    tc.receive(&alice, "2:0:deliver:o+5:bar:;{}")?;
    assert_eq!(pending(&tc), vec![(1, rslot("rp+2"))]);
    assert!(
        tc.comms
            .state()
            .remote(&alice)
            .expect("alice")
            .clist()
            .local_for(&rslot("rp+2"))
            .is_some()
    );

    tc.receive(&alice, "3:1:deliver:o+5:bar:;{}")?;
    assert!(pending(&tc).is_empty());
    let link = tc.comms.state().remote(&alice).expect("alice");
    assert!(link.clist().local_for(&rslot("rp+2")).is_none());
    assert_eq!(link.last_acked_seq(), Some(1));
    Ok(())
}
