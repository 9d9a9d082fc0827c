// 🗂️ Classifier - closed tax taxonomy
//
// Maps a message type tag (type URL or action) plus event types to exactly one
// TaxBit category. Rules are checked in a fixed precedence order; anything that
// matches nothing is an outbound transfer.

use crate::address::{is_address_shaped, WalletAddress};
use crate::normalizer::NormalizedTransaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    InboundBuy,
    InboundIncome,
    InboundAirdrop,
    InboundStakingReward,
    InboundStakingWithdrawal,
    OutboundSell,
    OutboundExpense,
    OutboundFee,
    OutboundStakingDeposit,
    OutboundTransfer,
    Swap,
    InternalTransfer,
    Ignore,
}

/// Which amount columns a category fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
    Both,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::InboundBuy,
        Category::InboundIncome,
        Category::InboundAirdrop,
        Category::InboundStakingReward,
        Category::InboundStakingWithdrawal,
        Category::OutboundSell,
        Category::OutboundExpense,
        Category::OutboundFee,
        Category::OutboundStakingDeposit,
        Category::OutboundTransfer,
        Category::Swap,
        Category::InternalTransfer,
        Category::Ignore,
    ];

    /// TaxBit display label
    pub fn label(&self) -> &'static str {
        match self {
            Category::InboundBuy => "Inbound > Buy",
            Category::InboundIncome => "Inbound > Income",
            Category::InboundAirdrop => "Inbound > Airdrop",
            Category::InboundStakingReward => "Inbound > Staking Reward",
            Category::InboundStakingWithdrawal => "Inbound > Staking Withdrawal",
            Category::OutboundSell => "Outbound > Sell",
            Category::OutboundExpense => "Outbound > Expense",
            Category::OutboundFee => "Outbound > Fee",
            Category::OutboundStakingDeposit => "Outbound > Staking Deposit",
            Category::OutboundTransfer => "Outbound > Transfer",
            Category::Swap => "Swap > Swap",
            Category::InternalTransfer => "Internal Transfer",
            Category::Ignore => "Ignore",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Category::InboundBuy
            | Category::InboundIncome
            | Category::InboundAirdrop
            | Category::InboundStakingReward
            | Category::InboundStakingWithdrawal => Direction::Inbound,
            Category::Swap => Direction::Both,
            _ => Direction::Outbound,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// RULES
// ============================================================================

/// One precedence rule: message names (last tag segment, or bare action) and
/// event types that trigger it
struct Rule {
    messages: &'static [&'static str],
    events: &'static [&'static str],
    kind: RuleKind,
}

#[derive(Clone, Copy)]
enum RuleKind {
    Fixed(Category),
    Evm,
}

const RULES: &[Rule] = &[
    Rule {
        messages: &["msgdelegate", "delegate"],
        events: &["delegate"],
        kind: RuleKind::Fixed(Category::OutboundStakingDeposit),
    },
    Rule {
        messages: &["msgwithdrawdelegatorreward", "withdraw_delegator_reward"],
        events: &["withdraw_rewards"],
        kind: RuleKind::Fixed(Category::InboundStakingReward),
    },
    Rule {
        messages: &["msgundelegate", "begin_unbonding"],
        events: &["unbond"],
        kind: RuleKind::Fixed(Category::InboundStakingWithdrawal),
    },
    Rule {
        messages: &["msgbeginredelegate", "begin_redelegate"],
        events: &["redelegate"],
        kind: RuleKind::Fixed(Category::Ignore),
    },
    // Every message emits a "transfer" event, so bank sends match on the tag only
    Rule {
        messages: &["msgsend", "msgmultisend", "send", "multisend"],
        events: &[],
        kind: RuleKind::Fixed(Category::OutboundTransfer),
    },
    Rule {
        messages: &["msgethereumtx", "ethereum_tx"],
        events: &["ethereum_tx"],
        kind: RuleKind::Evm,
    },
    Rule {
        messages: &["msgtransfer", "transfer"],
        events: &["ibc_transfer", "send_packet"],
        kind: RuleKind::Fixed(Category::OutboundTransfer),
    },
    Rule {
        messages: &[
            "msgvote",
            "msgvoteweighted",
            "msgsubmitproposal",
            "msgdeposit",
            "vote",
            "submit_proposal",
        ],
        events: &["proposal_vote", "submit_proposal", "proposal_deposit"],
        kind: RuleKind::Fixed(Category::Ignore),
    },
];

/// Last segment of a type URL (`/cosmos.bank.v1beta1.MsgSend` -> `msgsend`)
fn message_name(tag: &str) -> String {
    tag.trim()
        .rsplit(|c: char| c == '/' || c == '.')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ============================================================================
// CLASSIFY
// ============================================================================

/// Classify without recipient context: EVM calls are transfers
pub fn classify(message_type: &str, event_types: &BTreeSet<String>) -> Category {
    classify_with_recipient(message_type, event_types, None)
}

/// Classify with the recipient available for the EVM swap check
pub fn classify_with_recipient(
    message_type: &str,
    event_types: &BTreeSet<String>,
    recipient: Option<&str>,
) -> Category {
    let name = message_name(message_type);
    let events: BTreeSet<String> = event_types
        .iter()
        .map(|e| e.trim().to_ascii_lowercase())
        .collect();

    for rule in RULES {
        let hit = rule.messages.contains(&name.as_str())
            || rule.events.iter().any(|e| events.contains(*e));
        if !hit {
            continue;
        }

        return match rule.kind {
            RuleKind::Fixed(category) => category,
            RuleKind::Evm => match recipient.map(str::trim) {
                Some(to) if !to.is_empty() && !is_address_shaped(to) => Category::Swap,
                _ => Category::OutboundTransfer,
            },
        };
    }

    Category::OutboundTransfer
}

/// Wallet-aware adjustment of an outbound transfer
pub fn refine_direction(category: Category, tx: &NormalizedTransaction, wallet: &WalletAddress) -> Category {
    if category != Category::OutboundTransfer {
        return category;
    }

    let from_wallet = wallet.same_as(&tx.from_address);
    let to_wallet = wallet.same_as(&tx.to_address);

    match (from_wallet, to_wallet) {
        (true, true) => Category::InternalTransfer,
        (false, true) => Category::InboundIncome,
        _ => category,
    }
}

/// Full classification of a normalized record
pub fn classify_transaction(
    tx: &NormalizedTransaction,
    wallet: &WalletAddress,
    direction_aware: bool,
) -> Category {
    let recipient = Some(tx.to_address.as_str()).filter(|s| !s.is_empty());
    let category = classify_with_recipient(&tx.message_type, &tx.event_types, recipient);

    if direction_aware {
        refine_direction(category, tx, wallet)
    } else {
        category
    }
}

// ============================================================================
// TESTS
// ============================================================================
