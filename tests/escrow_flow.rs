//! End-to-end escrow flows against the in-memory chain.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockAttestor, MockChain, CONTRACT, PLAYER1, PLAYER2};
use wager_escrow::chain::{Amount, ChainKind, PayoutMode};
use wager_escrow::config::DepositAttribution;
use wager_escrow::escrow::{
    DepositMonitor, DepositPoller, ErrorClass, EscrowError, EscrowState, Player, SessionStore, Transition,
};
use wager_escrow::lifecycle::Shutdown;
use wager_escrow::vault::HostKey;

const ONE_BCH: u128 = 100_000_000;

#[tokio::test]
async fn test_bch_game_pays_winner_pot_minus_fee() {
    let h = common::direct(MockChain::new(ChainKind::BitcoinCash).with_fee(5_000));

    let bet = Amount::parse_decimal("1.0", ChainKind::BitcoinCash.decimals()).unwrap();
    assert_eq!(bet, Amount::new(ONE_BCH));

    let session = h
        .coordinator
        .create_escrow(ChainKind::BitcoinCash, bet, PLAYER1, PLAYER2)
        .await
        .unwrap();
    assert_eq!(session.state(), EscrowState::AwaitingDeposits);
    assert!(session.escrow_address().starts_with("mock1escrow"));

    h.chain.deposit(session.escrow_address(), ONE_BCH);
    let after_first = h.coordinator.check_deposits(session.id()).await.unwrap();
    assert!(after_first.has_deposited(Player::One));
    assert!(!after_first.has_deposited(Player::Two));
    assert_eq!(after_first.state(), EscrowState::AwaitingDeposits);

    h.chain.deposit(session.escrow_address(), ONE_BCH);
    let active = h.coordinator.check_deposits(session.id()).await.unwrap();
    assert_eq!(active.state(), EscrowState::Active);
    assert_eq!(active.observed_balance(), Some(Amount::new(2 * ONE_BCH)));

    let receipt = h.coordinator.settle(session.id(), PLAYER2).await.unwrap();
    assert_eq!(receipt.winner, PLAYER2);
    assert_eq!(receipt.mode, PayoutMode::DirectTransfer);

    let broadcasts = h.chain.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].to, PLAYER2);
    assert_eq!(broadcasts[0].amount, Amount::new(2 * ONE_BCH - 5_000));
    assert_eq!(broadcasts[0].from, session.escrow_address());
    assert_eq!(h.chain.balance_of(PLAYER2), Amount::new(199_995_000));

    let settled = h.coordinator.get(session.id()).await.unwrap();
    assert_eq!(settled.state(), EscrowState::Settled);
    assert_eq!(settled.winner(), Some(PLAYER2));
    assert_eq!(settled.tx_ids(), &[receipt.tx_id]);
    assert!(settled.payout_recorded());
}

#[tokio::test]
async fn test_payout_is_balance_minus_fee() {
    let h = common::direct(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create_active(500_000).await;

    h.coordinator.settle(session.id(), PLAYER1).await.unwrap();

    assert_eq!(h.chain.broadcasts()[0].amount, Amount::new(995_000));
    assert_eq!(h.chain.balance_of(session.escrow_address()), Amount::ZERO);
}

#[tokio::test]
async fn test_payout_keeps_minimum_reserve() {
    let h = common::direct(
        MockChain::new(ChainKind::Ripple)
            .with_fee(12)
            .with_reserve(10_000_000),
    );
    let session = h.create_active(25_000_000).await;

    h.coordinator.settle(session.id(), PLAYER1).await.unwrap();

    assert_eq!(
        h.chain.broadcasts()[0].amount,
        Amount::new(50_000_000 - 12 - 10_000_000)
    );
    assert_eq!(h.chain.balance_of(session.escrow_address()), Amount::new(10_000_000));
}

#[tokio::test]
async fn test_winner_match_ignores_case() {
    let h = common::direct(MockChain::new(ChainKind::Ethereum).with_fee(21_000));
    let session = h.create_active(1_000_000).await;

    let receipt = h
        .coordinator
        .settle(session.id(), &PLAYER1.to_uppercase())
        .await
        .unwrap();

    assert_eq!(receipt.winner, PLAYER1);
    assert_eq!(h.chain.broadcasts()[0].to, PLAYER1);
}

#[tokio::test]
async fn test_settle_rejects_non_player() {
    let h = common::direct(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create_active(1_000_000).await;

    let err = h
        .coordinator
        .settle(session.id(), "mock1mallory")
        .await
        .unwrap_err();

    assert!(matches!(err.root(), EscrowError::InvalidWinner(w) if w == "mock1mallory"));
    assert!(matches!(
        err,
        EscrowError::Session { transition: Transition::Settle, .. }
    ));
    assert!(h.chain.broadcasts().is_empty());
    assert_eq!(h.coordinator.get(session.id()).await.unwrap().state(), EscrowState::Active);
}

#[tokio::test]
async fn test_settle_before_deposits_is_rejected() {
    let h = common::direct(MockChain::new(ChainKind::Solana));
    let session = h.create(1_000).await;

    let err = h.coordinator.settle(session.id(), PLAYER1).await.unwrap_err();
    assert!(matches!(
        err.root(),
        EscrowError::NotActive(EscrowState::AwaitingDeposits)
    ));
}

#[tokio::test]
async fn test_second_settle_reports_already_settled() {
    let h = common::direct(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create_active(1_000_000).await;

    h.coordinator.settle(session.id(), PLAYER1).await.unwrap();
    let err = h.coordinator.settle(session.id(), PLAYER2).await.unwrap_err();

    assert!(matches!(err.root(), EscrowError::AlreadySettled));
    assert_eq!(h.chain.broadcasts().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_settles_broadcast_once() {
    let h = common::direct(
        MockChain::new(ChainKind::Solana)
            .with_fee(5_000)
            .with_broadcast_delay(Duration::from_millis(20)),
    );
    let session = h.create_active(1_000_000).await;

    let mut handles = Vec::new();
    for winner in [PLAYER1, PLAYER2, PLAYER1, PLAYER2] {
        let coordinator = Arc::clone(&h.coordinator);
        let id = session.id();
        handles.push(tokio::spawn(async move { coordinator.settle(id, winner).await }));
    }

    let mut successes = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => successes.push(receipt),
            Err(e) => assert!(matches!(e.root(), EscrowError::AlreadySettled), "unexpected {e}"),
        }
    }

    assert_eq!(successes.len(), 1);
    assert_eq!(h.chain.broadcasts().len(), 1);
    let settled = h.coordinator.get(session.id()).await.unwrap();
    assert_eq!(settled.winner(), Some(successes[0].winner.as_str()));
}

#[tokio::test]
async fn test_insufficient_balance_leaves_session_active() {
    let h = common::manual(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create(1_000_000).await;
    h.coordinator.confirm_deposit(session.id(), Player::One).await.unwrap();
    h.coordinator.confirm_deposit(session.id(), Player::Two).await.unwrap();
    h.chain.set_balance(session.escrow_address(), 5_000);

    let err = h.coordinator.settle(session.id(), PLAYER1).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Balance);
    assert!(matches!(
        err.root(),
        EscrowError::InsufficientBalance { available, .. } if *available == Amount::new(5_000)
    ));
    assert!(h.chain.broadcasts().is_empty());
    assert_eq!(h.coordinator.get(session.id()).await.unwrap().state(), EscrowState::Active);
}

#[tokio::test]
async fn test_rejected_broadcast_moves_session_to_failed() {
    let h = common::direct(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create_active(1_000_000).await;
    h.chain.reject_broadcasts("blockhash not found");

    let err = h.coordinator.settle(session.id(), PLAYER2).await.unwrap_err();
    assert!(matches!(err.root(), EscrowError::BroadcastRejected(_)));

    let failed = h.coordinator.get(session.id()).await.unwrap();
    assert_eq!(failed.state(), EscrowState::Failed);
    let record = failed.failure().unwrap();
    assert_eq!(record.transition, Transition::Settle);
    assert_eq!(record.from_state, EscrowState::Settled);
    assert_eq!(record.intended_winner.as_deref(), Some(PLAYER2));
    assert!(record.reason.contains("blockhash not found"));

    let retry = h.coordinator.settle(session.id(), PLAYER2).await.unwrap_err();
    assert!(matches!(retry.root(), EscrowError::NotActive(EscrowState::Failed)));
    let refund = h.coordinator.refund(session.id()).await.unwrap_err();
    assert!(matches!(refund.root(), EscrowError::NotActive(EscrowState::Failed)));
}

#[tokio::test]
async fn test_wrong_host_key_fails_closed() {
    let h = common::direct(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create_active(1_000_000).await;

    let other = h.with_key(h.direct_registry(), HostKey::from_bytes(&[9u8; 32]));
    let err = other.settle(session.id(), PLAYER1).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Custody);
    assert!(h.chain.broadcasts().is_empty());

    let failed = h.coordinator.get(session.id()).await.unwrap();
    assert_eq!(failed.state(), EscrowState::Failed);
    assert_eq!(failed.failure().unwrap().from_state, EscrowState::Active);
}

#[tokio::test]
async fn test_refund_returns_single_deposit() {
    let h = common::direct(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create(1_000_000).await;
    h.chain.deposit(session.escrow_address(), 1_000_000);

    let receipt = h.coordinator.refund(session.id()).await.unwrap();

    assert_eq!(receipt.transfers.len(), 1);
    assert_eq!(receipt.transfers[0].player, Player::One);
    assert_eq!(receipt.transfers[0].amount, Amount::new(995_000));
    assert_eq!(receipt.tx_ids.len(), 1);
    assert_eq!(h.chain.balance_of(PLAYER1), Amount::new(995_000));
    assert_eq!(h.chain.balance_of(PLAYER2), Amount::ZERO);

    let refunded = h.coordinator.get(session.id()).await.unwrap();
    assert_eq!(refunded.state(), EscrowState::Refunded);
    assert_eq!(refunded.tx_ids(), receipt.tx_ids.as_slice());
}

#[tokio::test]
async fn test_refund_aborts_when_second_deposit_lands() {
    let h = common::direct(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create(1_000_000).await;
    h.chain.deposit(session.escrow_address(), 1_000_000);
    let checked = h.coordinator.check_deposits(session.id()).await.unwrap();
    assert_eq!(checked.depositors(), vec![Player::One]);

    // Player two pays before the refund reads the balance.
    h.chain.deposit_on_read(h.chain.balance_reads() + 1, session.escrow_address(), 1_000_000);
    let err = h.coordinator.refund(session.id()).await.unwrap_err();

    assert!(matches!(err.root(), EscrowError::NotActive(EscrowState::Active)));
    assert!(h.chain.broadcasts().is_empty());
    assert_eq!(h.chain.balance_of(PLAYER1), Amount::ZERO);
    let active = h.coordinator.get(session.id()).await.unwrap();
    assert_eq!(active.state(), EscrowState::Active);
    assert_eq!(active.observed_balance(), Some(Amount::new(2_000_000)));
}

#[tokio::test]
async fn test_refund_pays_no_more_than_own_stake() {
    let h = common::direct(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create(1_000_000).await;
    h.chain.deposit(session.escrow_address(), 1_000_000);
    h.coordinator.check_deposits(session.id()).await.unwrap();

    // A partial second deposit does not confirm player two.
    h.chain.deposit_on_read(h.chain.balance_reads() + 1, session.escrow_address(), 400_000);
    let receipt = h.coordinator.refund(session.id()).await.unwrap();

    assert_eq!(receipt.transfers.len(), 1);
    assert_eq!(receipt.transfers[0].amount, Amount::new(995_000));
    assert_eq!(h.chain.balance_of(PLAYER1), Amount::new(995_000));
    assert_eq!(h.chain.balance_of(session.escrow_address()), Amount::new(400_000));
}

#[tokio::test]
async fn test_refund_outage_moves_session_to_failed() {
    let h = common::direct(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create(1_000_000).await;
    h.chain.deposit(session.escrow_address(), 1_000_000);
    h.chain.fail_balance_reads(10);

    let err = h.coordinator.refund(session.id()).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Network);
    assert!(h.chain.broadcasts().is_empty());
    let failed = h.coordinator.get(session.id()).await.unwrap();
    assert_eq!(failed.state(), EscrowState::Failed);
    let record = failed.failure().unwrap();
    assert_eq!(record.transition, Transition::Refund);
    assert_eq!(record.from_state, EscrowState::AwaitingDeposits);
    assert!(failed.tx_ids().is_empty());
}

#[tokio::test]
async fn test_settle_outage_moves_session_to_failed() {
    let h = common::direct(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create_active(1_000_000).await;
    h.chain.fail_balance_reads(10);

    let err = h.coordinator.settle(session.id(), PLAYER1).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Network);
    assert!(h.chain.broadcasts().is_empty());
    let failed = h.coordinator.get(session.id()).await.unwrap();
    assert_eq!(failed.state(), EscrowState::Failed);
    let record = failed.failure().unwrap();
    assert_eq!(record.transition, Transition::Settle);
    assert_eq!(record.from_state, EscrowState::Active);
}

#[tokio::test]
async fn test_threshold_attribution_per_balance() {
    let h = common::direct(MockChain::new(ChainKind::Solana));
    let session = h.create(1_000).await;
    let monitor = DepositMonitor::new(DepositAttribution::BalanceThreshold, common::fast_retries());
    let address = session.escrow_address().to_string();

    let cases = [
        (999, false, false),
        (1_000, true, false),
        (1_500, true, false),
        (1_999, true, false),
        (2_000, true, true),
        (5_000, true, true),
    ];
    for (balance, one, two) in cases {
        h.chain.set_balance(&address, balance);
        let first = monitor.check_deposit(&*h.chain, &session, Player::One).await.unwrap();
        let second = monitor.check_deposit(&*h.chain, &session, Player::Two).await.unwrap();
        assert_eq!((first, second), (one, two), "balance {}", balance);
    }
}

#[tokio::test]
async fn test_check_deposit_reports_outage() {
    let h = common::direct(MockChain::new(ChainKind::Solana));
    let session = h.create(1_000).await;
    let monitor = DepositMonitor::new(DepositAttribution::BalanceThreshold, common::fast_retries());
    h.chain.fail_balance_reads(10);

    let result = monitor.check_deposit(&*h.chain, &session, Player::One).await;
    assert!(result.is_err());
    assert_eq!(h.chain.balance_reads(), 3);
}

#[tokio::test]
async fn test_refund_without_deposits_sends_nothing() {
    let h = common::direct(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create(1_000_000).await;

    let receipt = h.coordinator.refund(session.id()).await.unwrap();

    assert!(receipt.transfers.is_empty());
    assert!(h.chain.broadcasts().is_empty());
    assert_eq!(
        h.coordinator.get(session.id()).await.unwrap().state(),
        EscrowState::Refunded
    );
}

#[tokio::test]
async fn test_refund_after_activation_is_rejected() {
    let h = common::direct(MockChain::new(ChainKind::Solana).with_fee(5_000));
    let session = h.create_active(1_000_000).await;

    let err = h.coordinator.refund(session.id()).await.unwrap_err();
    assert!(matches!(err.root(), EscrowError::NotActive(EscrowState::Active)));

    h.coordinator.settle(session.id(), PLAYER1).await.unwrap();
    let err = h.coordinator.refund(session.id()).await.unwrap_err();
    assert!(matches!(err.root(), EscrowError::NotActive(EscrowState::Settled)));
    assert_eq!(h.chain.broadcasts().len(), 1);
}

#[tokio::test]
async fn test_deposit_flags_never_clear() {
    let h = common::direct(MockChain::new(ChainKind::Tezos));
    let session = h.create(1_000).await;

    h.chain.deposit(session.escrow_address(), 1_000);
    let first = h.coordinator.check_deposits(session.id()).await.unwrap();
    assert!(first.has_deposited(Player::One));

    h.chain.set_balance(session.escrow_address(), 0);
    let after_drop = h.coordinator.check_deposits(session.id()).await.unwrap();
    assert!(after_drop.has_deposited(Player::One));
    assert_eq!(after_drop.observed_balance(), Some(Amount::ZERO));
    assert_eq!(after_drop.state(), EscrowState::AwaitingDeposits);
}

#[tokio::test]
async fn test_transient_balance_failures_are_retried() {
    let h = common::direct(MockChain::new(ChainKind::Solana));
    let session = h.create(1_000).await;
    h.chain.deposit(session.escrow_address(), 2_000);
    h.chain.fail_balance_reads(2);

    let checked = h.coordinator.check_deposits(session.id()).await.unwrap();

    assert_eq!(checked.state(), EscrowState::Active);
    assert_eq!(h.chain.balance_reads(), 3);
}

#[tokio::test]
async fn test_persistent_outage_leaves_session_untouched() {
    let h = common::direct(MockChain::new(ChainKind::Solana));
    let session = h.create(1_000).await;
    h.chain.deposit(session.escrow_address(), 2_000);
    h.chain.fail_balance_reads(10);

    let err = h.coordinator.check_deposits(session.id()).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Network);
    assert_eq!(h.chain.balance_reads(), 3);
    let unchanged = h.coordinator.get(session.id()).await.unwrap();
    assert_eq!(unchanged.state(), EscrowState::AwaitingDeposits);
    assert_eq!(unchanged.version(), session.version());
}

#[tokio::test]
async fn test_manual_confirmation_ignores_balances() {
    let h = common::manual(MockChain::new(ChainKind::Polkadot));
    let session = h.create(1_000).await;
    h.chain.deposit(session.escrow_address(), 5_000);

    let checked = h.coordinator.check_deposits(session.id()).await.unwrap();
    assert_eq!(checked.observed_balance(), Some(Amount::new(5_000)));
    assert!(checked.depositors().is_empty());

    let one = h.coordinator.confirm_deposit(session.id(), Player::Two).await.unwrap();
    assert_eq!(one.depositors(), vec![Player::Two]);
    let again = h.coordinator.confirm_deposit(session.id(), Player::Two).await.unwrap();
    assert_eq!(again.version(), one.version());

    let active = h.coordinator.confirm_deposit(session.id(), Player::One).await.unwrap();
    assert_eq!(active.state(), EscrowState::Active);
}

#[tokio::test]
async fn test_authorized_settle_submits_attestation() {
    let h = common::authorized(MockChain::new(ChainKind::EthereumClassic).with_fee(21_000));
    let session = h.create_active(1_000_000_000).await;

    let receipt = h.coordinator.settle(session.id(), PLAYER2).await.unwrap();

    assert_eq!(receipt.mode, PayoutMode::AuthorizedContract);
    let payouts = h.chain.payouts();
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].winner, PLAYER2);
    assert_eq!(payouts[0].signature, MockAttestor::expected_signature(PLAYER2));

    // The pot moved into the contract before the payout call.
    let sweeps = h.chain.broadcasts();
    assert_eq!(sweeps.len(), 1);
    assert_eq!(sweeps[0].to, CONTRACT);
    assert_eq!(h.chain.balance_of(session.escrow_address()), Amount::ZERO);
    assert_eq!(h.chain.balance_of(CONTRACT), Amount::new(2_000_000_000 - 21_000));

    let settled = h.coordinator.get(session.id()).await.unwrap();
    assert_eq!(settled.state(), EscrowState::Settled);
    assert_eq!(receipt.tx_ids, vec![sweeps[0].tx_id.clone(), receipt.tx_id.clone()]);
    assert_eq!(settled.tx_ids(), receipt.tx_ids.as_slice());
}

#[tokio::test]
async fn test_rejected_contract_payout_records_sweep() {
    let h = common::authorized(MockChain::new(ChainKind::EthereumClassic).with_fee(21_000));
    let session = h.create_active(1_000_000_000).await;
    h.chain.reject_payouts("execution reverted");

    let err = h.coordinator.settle(session.id(), PLAYER1).await.unwrap_err();

    assert!(matches!(err.root(), EscrowError::BroadcastRejected(_)));
    let sweeps = h.chain.broadcasts();
    assert_eq!(sweeps.len(), 1);
    assert!(h.chain.payouts().is_empty());

    let failed = h.coordinator.get(session.id()).await.unwrap();
    assert_eq!(failed.state(), EscrowState::Failed);
    assert_eq!(failed.tx_ids(), &[sweeps[0].tx_id.clone()]);
    assert!(failed.failure().unwrap().reason.contains("execution reverted"));
}

#[tokio::test]
async fn test_authorized_submission_failure_is_recorded() {
    let h = common::authorized(MockChain::new(ChainKind::Tron));
    let session = h.create_active(10_000_000).await;
    h.chain.reject_broadcasts("contract reverted");

    let err = h.coordinator.settle(session.id(), PLAYER1).await.unwrap_err();

    assert!(matches!(err.root(), EscrowError::BroadcastRejected(_)));
    let failed = h.coordinator.get(session.id()).await.unwrap();
    assert_eq!(failed.state(), EscrowState::Failed);
    assert_eq!(failed.failure().unwrap().intended_winner.as_deref(), Some(PLAYER1));
}

#[tokio::test]
async fn test_create_validates_input() {
    let h = common::direct(MockChain::new(ChainKind::Solana));

    let zero = h
        .coordinator
        .create_escrow(ChainKind::Solana, Amount::ZERO, PLAYER1, PLAYER2)
        .await
        .unwrap_err();
    assert!(matches!(zero, EscrowError::InvalidAmount(_)));

    let bad = h
        .coordinator
        .create_escrow(ChainKind::Solana, Amount::new(1), "not an address", PLAYER2)
        .await
        .unwrap_err();
    assert!(matches!(bad, EscrowError::InvalidAddress(_)));

    let same = h
        .coordinator
        .create_escrow(ChainKind::Solana, Amount::new(1), PLAYER1, &PLAYER1.to_uppercase())
        .await
        .unwrap_err();
    assert!(matches!(same, EscrowError::InvalidAddress(_)));

    let unsupported = h
        .coordinator
        .create_escrow(ChainKind::Tezos, Amount::new(1), PLAYER1, PLAYER2)
        .await
        .unwrap_err();
    assert!(matches!(unsupported, EscrowError::UnsupportedChain(ChainKind::Tezos)));

    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_stored_session_holds_only_ciphertext() {
    let h = common::direct(MockChain::new(ChainKind::Solana));
    let session = h.create(1_000).await;

    let secret = h.chain.secret_for(session.escrow_address()).unwrap();
    let stored = h.store.get(session.id()).await.unwrap().unwrap();
    let json = serde_json::to_string(&stored).unwrap();

    assert!(!json.contains(&hex::encode(&secret)));
    assert_ne!(stored.escrow_identity().encrypted_secret.ciphertext, secret);
}

#[tokio::test]
async fn test_unknown_session() {
    let h = common::direct(MockChain::new(ChainKind::Solana));
    let id = wager_escrow::SessionId::new();

    assert!(matches!(
        h.coordinator.get(id).await,
        Err(EscrowError::SessionNotFound(_))
    ));
    assert!(matches!(
        h.coordinator.settle(id, PLAYER1).await.unwrap_err().root(),
        EscrowError::SessionNotFound(_)
    ));
}

#[tokio::test]
async fn test_poll_once_activates_funded_sessions() {
    let h = common::direct(MockChain::new(ChainKind::Solana));
    let funded = h.create(1_000).await;
    let idle = h.create(1_000).await;
    h.chain.deposit(funded.escrow_address(), 2_000);

    let poller = DepositPoller::new(Arc::clone(&h.coordinator), Duration::from_secs(60));
    let summary = poller.poll_once().await;

    assert_eq!(summary.checked, 2);
    assert_eq!(summary.activated, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(h.coordinator.get(funded.id()).await.unwrap().state(), EscrowState::Active);
    assert_eq!(
        h.coordinator.get(idle.id()).await.unwrap().state(),
        EscrowState::AwaitingDeposits
    );

    // Active sessions are no longer polled.
    let second = poller.poll_once().await;
    assert_eq!(second.checked, 1);
}

#[tokio::test]
async fn test_poller_runs_until_shutdown() {
    let h = common::direct(MockChain::new(ChainKind::Solana));
    let session = h.create(1_000).await;
    let shutdown = Shutdown::new();

    let poller = DepositPoller::new(Arc::clone(&h.coordinator), Duration::from_millis(10));
    let handle = tokio::spawn(poller.run(shutdown.subscribe()));

    h.chain.deposit(session.escrow_address(), 2_000);
    let mut state = EscrowState::AwaitingDeposits;
    for _ in 0..100 {
        state = h.coordinator.get(session.id()).await.unwrap().state();
        if state == EscrowState::Active {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state, EscrowState::Active);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("poller did not stop")
        .unwrap();
}
