// Copyright (C) 2013-2020 Blockstack PBC, a public benefit corporation
// Copyright (C) 2020-2024 Stacks Open Internet Foundation
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use pox_common::consts::CHAIN_ID_TESTNET;
use pox_common::util::hash::to_hex;

use super::*;
use crate::config::ReplayKeyScope;
use crate::errors::{AuthError, StackingError};
use crate::events::PoxEventName;
use crate::signed_structured_data::pox4::make_pox_4_signer_key_message_hash;

const MAX_AMOUNT: u128 = 20_960_000_000_000;
const AMOUNT: u128 = STACKING_THRESHOLD * 3 / 2;

fn pox_4_ledger(stackers: &[&TestStacker]) -> PoxContract<MemoryStxLedger> {
    test_ledger(test_config(PoxVersion::Pox4), stackers)
}

fn stack_args(signer: &TestStacker, stacker: &TestStacker, auth_id: u128) -> SignerArgs {
    signer.sign(
        &stacker.pox_addr,
        Pox4SignatureTopic::StackStx,
        0,
        10,
        MAX_AMOUNT,
        auth_id,
    )
}

#[test]
fn get_pox_info_reports_testnet_parameters() {
    let pox = pox_4_ledger(&[]);
    let info = pox.get_pox_info().unwrap();
    assert_eq!(info.min_amount_ustx, STACKING_THRESHOLD);
    assert_eq!(info.reward_cycle_id, 0);
    assert_eq!(info.prepare_cycle_length, 50);
    assert_eq!(info.first_burnchain_block_height, 0);
    assert_eq!(info.reward_cycle_length, 1050);
    assert_eq!(info.total_liquid_supply_ustx, FUNDED_ACCOUNTS * INITIAL_BALANCE);
}

#[test]
fn can_stack_stx_with_a_signature() {
    let alice = TestStacker::new("alice");
    let signer = TestStacker::new("signer");
    let mut pox = pox_4_ledger(&[&alice]);

    let args = stack_args(&signer, &alice, 0);
    let receipt = pox
        .stack_stx(&alice.principal, AMOUNT, &alice.pox_addr, 0, 10, Some(&args))
        .unwrap();
    assert_eq!(receipt.lock_amount, AMOUNT);
    assert_eq!(receipt.unlock_burn_height, 11550);
    assert_eq!(receipt.signer_key, Some(signer.signer_key()));

    let state = pox.get_stacker_info(&alice.principal).unwrap();
    assert_eq!(state.signer_key, Some(signer.signer_key()));
    assert_eq!(state.reward_set_indexes.len(), 10);
    let entry = pox.get_reward_set_pox_address(1, 0).unwrap();
    assert_eq!(entry.signer, Some(signer.signer_key()));
    assert_eq!(entry.stacker.as_ref(), Some(&alice.principal));
    assert_eq!(pox.get_total_ustx_stacked(10), AMOUNT);
    assert_eq!(pox.get_total_ustx_stacked(11), 0);

    let events = pox.take_events();
    assert_eq!(events.len(), 1);
    let json = events[0].to_json().unwrap();
    assert_eq!(json["name"], "stack-stx");
    assert_eq!(json["data"]["signer-key"], to_hex(&signer.signer_key()));
}

#[test]
fn one_signer_backs_many_stackers() {
    let stackers = [
        TestStacker::new("alice"),
        TestStacker::new("bob"),
        TestStacker::new("carl"),
    ];
    let signer = TestStacker::new("signer");
    let mut pox = pox_4_ledger(&stackers.iter().collect::<Vec<_>>());

    for (auth_id, stacker) in stackers.iter().enumerate() {
        let args = stack_args(&signer, stacker, auth_id as u128);
        pox.stack_stx(&stacker.principal, AMOUNT, &stacker.pox_addr, 0, 10, Some(&args))
            .unwrap();
    }

    assert_eq!(pox.get_reward_set_size(1), 3);
    assert_eq!(pox.get_total_ustx_stacked(1), 3 * AMOUNT);
    for (index, stacker) in stackers.iter().enumerate() {
        let entry = pox.get_reward_set_pox_address(1, index as u128).unwrap();
        assert_eq!(entry.pox_addr, stacker.pox_addr);
        assert_eq!(entry.signer, Some(signer.signer_key()));
    }
}

#[test]
fn signatures_cannot_be_replayed() {
    let alice = TestStacker::new("alice");
    let bob = TestStacker::new("bob");
    let signer = TestStacker::new("signer");
    let mut pox = pox_4_ledger(&[&alice, &bob]);

    let args = stack_args(&signer, &alice, 0);
    pox.stack_stx(&alice.principal, AMOUNT, &alice.pox_addr, 0, 10, Some(&args))
        .unwrap();

    // bob reuses the exact message alice was given
    let err = pox
        .stack_stx(&bob.principal, AMOUNT, &alice.pox_addr, 0, 10, Some(&args))
        .unwrap_err();
    assert_eq!(err, StackingError::Auth(AuthError::AlreadyUsed));
    assert_eq!(err.code(), 39);

    // a fresh auth id is a fresh message
    let args = stack_args(&signer, &alice, 1);
    pox.stack_stx(&bob.principal, AMOUNT, &alice.pox_addr, 0, 10, Some(&args))
        .unwrap();
    assert_eq!(pox.get_reward_set_size(1), 2);
}

#[test]
fn auth_id_scope_rejects_reuse_across_messages() {
    let alice = TestStacker::new("alice");
    let bob = TestStacker::new("bob");
    let signer = TestStacker::new("signer");
    let mut config = test_config(PoxVersion::Pox4);
    config.signer_auth.replay_key = ReplayKeyScope::AuthId;
    let mut pox = test_ledger(config, &[&alice, &bob]);

    let args = stack_args(&signer, &alice, 7);
    pox.stack_stx(&alice.principal, AMOUNT, &alice.pox_addr, 0, 10, Some(&args))
        .unwrap();

    // a different pox address, but the same signer key and auth id
    let args = stack_args(&signer, &bob, 7);
    assert_eq!(
        pox.stack_stx(&bob.principal, AMOUNT, &bob.pox_addr, 0, 10, Some(&args))
            .unwrap_err()
            .code(),
        39
    );
    let args = stack_args(&signer, &bob, 8);
    pox.stack_stx(&bob.principal, AMOUNT, &bob.pox_addr, 0, 10, Some(&args))
        .unwrap();
}

#[test]
fn signer_rejections() {
    let alice = TestStacker::new("alice");
    let signer = TestStacker::new("signer");
    let mut pox = pox_4_ledger(&[&alice]);
    let addr = &alice.pox_addr;
    let stack = |pox: &mut PoxContract<MemoryStxLedger>, args: Option<&SignerArgs>| {
        pox.stack_stx(&alice.principal, AMOUNT, addr, 0, 10, args)
            .unwrap_err()
    };

    let err = stack(&mut pox, None);
    assert_eq!(err, StackingError::Auth(AuthError::MissingSignerKey));
    assert_eq!(err.code(), 32);

    let mut short_key = stack_args(&signer, &alice, 0);
    short_key.signer_key.pop();
    assert_eq!(
        stack(&mut pox, Some(&short_key)),
        StackingError::Auth(AuthError::InvalidSignerKey)
    );

    let low_max = signer.sign(addr, Pox4SignatureTopic::StackStx, 0, 10, AMOUNT - 1, 0);
    assert_eq!(stack(&mut pox, Some(&low_max)).code(), 38);

    // signed for a different period than the one requested
    let wrong_period = signer.sign(addr, Pox4SignatureTopic::StackStx, 0, 9, MAX_AMOUNT, 0);
    assert_eq!(
        stack(&mut pox, Some(&wrong_period)),
        StackingError::Auth(AuthError::BadSignature)
    );

    let wrong_topic = signer.sign(addr, Pox4SignatureTopic::StackExtend, 0, 10, MAX_AMOUNT, 0);
    assert_eq!(stack(&mut pox, Some(&wrong_topic)).code(), 35);

    // signed by someone else than the key it names
    let mut wrong_key = stack_args(&signer, &alice, 0);
    wrong_key.signer_key = alice.signer_key().to_vec();
    assert_eq!(stack(&mut pox, Some(&wrong_key)).code(), 35);

    let unsigned = SignerArgs::unsigned(&signer.signer_key(), MAX_AMOUNT, 0);
    assert_eq!(
        stack(&mut pox, Some(&unsigned)),
        StackingError::Auth(AuthError::NotAllowed)
    );

    assert!(pox.get_stacker_info(&alice.principal).is_none());
    assert!(pox.take_events().is_empty());
}

#[test]
fn rolled_back_calls_do_not_consume_authorizations() {
    let alice = TestStacker::new("alice");
    let signer = TestStacker::new("signer");
    let mut pox = pox_4_ledger(&[&alice]);
    let args = stack_args(&signer, &alice, 0);

    let result = pox.transaction(|pox| -> Result<(), StackingError> {
        pox.stack_stx(&alice.principal, AMOUNT, &alice.pox_addr, 0, 10, Some(&args))?;
        Err(StackingError::InvalidAmount)
    });
    assert!(result.is_err());
    assert!(pox.data.used_signer_key_authorizations().is_empty());

    pox.stack_stx(&alice.principal, AMOUNT, &alice.pox_addr, 0, 10, Some(&args))
        .unwrap();
    assert_eq!(pox.data.used_signer_key_authorizations().len(), 1);
}

#[test]
fn can_extend_and_increase_with_signatures() {
    let alice = TestStacker::new("alice");
    let signer = TestStacker::new("signer");
    let new_signer = TestStacker::new("new-signer");
    let mut pox = pox_4_ledger(&[&alice]);
    let args = stack_args(&signer, &alice, 0);
    pox.stack_stx(&alice.principal, AMOUNT, &alice.pox_addr, 0, 10, Some(&args))
        .unwrap();

    pox.advance_burn_blocks(CYCLE_LENGTH);
    let args = new_signer.sign(
        &alice.pox_addr,
        Pox4SignatureTopic::StackExtend,
        1,
        2,
        MAX_AMOUNT,
        0,
    );
    let receipt = pox
        .stack_extend(&alice.principal, 2, &alice.pox_addr, Some(&args))
        .unwrap();
    assert_eq!(receipt.unlock_burn_height, 13 * CYCLE_LENGTH);
    let state = pox.get_stacker_info(&alice.principal).unwrap().clone();
    assert_eq!(state.lock_period, 12);
    assert_eq!(state.signer_key, Some(new_signer.signer_key()));
    assert_eq!(
        pox.get_reward_set_pox_address(12, 0).unwrap().signer,
        Some(new_signer.signer_key())
    );

    // the increase is signed over the new total and the full lock period
    let args = new_signer.sign(
        &alice.pox_addr,
        Pox4SignatureTopic::StackIncrease,
        1,
        12,
        MAX_AMOUNT,
        1,
    );
    let receipt = pox
        .stack_increase(&alice.principal, AMOUNT, Some(&args))
        .unwrap();
    assert_eq!(receipt.total_locked, 2 * AMOUNT);
    assert_eq!(pox.get_total_ustx_stacked(1), AMOUNT);
    assert_eq!(pox.get_total_ustx_stacked(2), 2 * AMOUNT);
    assert_eq!(pox.get_total_ustx_stacked(12), 2 * AMOUNT);

    let names: Vec<_> = pox.take_events().iter().map(|e| e.name).collect();
    assert_eq!(
        names,
        vec![
            PoxEventName::StackStx,
            PoxEventName::StackExtend,
            PoxEventName::StackIncrease
        ]
    );
}

#[test]
fn pre_set_authorizations_replace_signatures() {
    let alice = TestStacker::new("alice");
    let signer = TestStacker::new("signer");
    let mut pox = pox_4_ledger(&[&alice, &signer]);
    let key = signer.signer_key();

    // only the key's owner may authorize
    assert_eq!(
        pox.set_signer_key_authorization(
            &alice.principal,
            &alice.pox_addr,
            10,
            0,
            Pox4SignatureTopic::StackStx,
            &key,
            true,
            MAX_AMOUNT,
            0,
        )
        .unwrap_err()
        .code(),
        19
    );
    assert_eq!(
        pox.set_signer_key_authorization(
            &signer.principal,
            &alice.pox_addr,
            0,
            0,
            Pox4SignatureTopic::StackStx,
            &key,
            true,
            MAX_AMOUNT,
            0,
        )
        .unwrap_err()
        .code(),
        2
    );

    assert!(pox
        .set_signer_key_authorization(
            &signer.principal,
            &alice.pox_addr,
            10,
            0,
            Pox4SignatureTopic::StackStx,
            &key,
            true,
            MAX_AMOUNT,
            0,
        )
        .unwrap());
    let events = pox.take_events();
    assert_eq!(events[0].name, PoxEventName::SetSignerKeyAuthorization);

    let args = SignerArgs::unsigned(&key, MAX_AMOUNT, 0);
    pox.stack_stx(&alice.principal, AMOUNT, &alice.pox_addr, 0, 10, Some(&args))
        .unwrap();
    assert_eq!(
        pox.get_stacker_info(&alice.principal).unwrap().signer_key,
        Some(key)
    );

    // the signer may always use its own key, no signature needed
    let args = SignerArgs::unsigned(&key, MAX_AMOUNT, 0);
    pox.stack_stx(&signer.principal, AMOUNT, &signer.pox_addr, 0, 10, Some(&args))
        .unwrap();
}

#[test]
fn withdrawn_authorizations_are_refused() {
    let alice = TestStacker::new("alice");
    let signer = TestStacker::new("signer");
    let mut pox = pox_4_ledger(&[&alice]);
    let key = signer.signer_key();
    for allowed in [true, false] {
        pox.set_signer_key_authorization(
            &signer.principal,
            &alice.pox_addr,
            10,
            0,
            Pox4SignatureTopic::StackStx,
            &key,
            allowed,
            MAX_AMOUNT,
            0,
        )
        .unwrap();
    }
    let args = SignerArgs::unsigned(&key, MAX_AMOUNT, 0);
    assert_eq!(
        pox.stack_stx(&alice.principal, AMOUNT, &alice.pox_addr, 0, 10, Some(&args))
            .unwrap_err()
            .code(),
        19
    );
}

#[test]
fn message_hash_matches_what_signers_sign() {
    let alice = TestStacker::new("alice");
    let pox = pox_4_ledger(&[&alice]);
    let hash = pox.get_signer_key_message_hash(
        &alice.pox_addr,
        1,
        Pox4SignatureTopic::StackStx,
        10,
        MAX_AMOUNT,
        3,
    );
    assert_eq!(
        hash,
        make_pox_4_signer_key_message_hash(
            &alice.pox_addr,
            1,
            &Pox4SignatureTopic::StackStx,
            CHAIN_ID_TESTNET,
            10,
            MAX_AMOUNT,
            3,
        )
    );
    assert_ne!(
        hash,
        pox.get_signer_key_message_hash(
            &alice.pox_addr,
            1,
            Pox4SignatureTopic::StackStx,
            10,
            MAX_AMOUNT,
            4,
        )
    );
}
