//! Automatic allocation planning.
//!
//! Pure functions: given the open invoices of a customer and the amount
//! still unallocated on a payment, decide how much goes to each invoice.
//! Every plan satisfies `Σ amount ≤ available` and `amount ≤ balance` per
//! invoice, and never contains a zero amount.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// 100% in basis points
pub const FULL_BASIS_POINTS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Oldest due date first
    Fifo,
    /// Split pro rata to open balance
    Proportional,
    /// Most overdue first, then by due date
    OverdueFirst,
    /// Largest open balance first
    LargestFirst,
    /// Same amount to every invoice, capped by balance
    EqualDistribution,
    /// Caller-chosen share of the payment per invoice
    PercentageBased,
    /// Caller-chosen invoice order, then by due date
    CustomPriority,
}

impl AllocationStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            AllocationStrategy::Fifo => "fifo",
            AllocationStrategy::Proportional => "proportional",
            AllocationStrategy::OverdueFirst => "overdue_first",
            AllocationStrategy::LargestFirst => "largest_first",
            AllocationStrategy::EqualDistribution => "equal_distribution",
            AllocationStrategy::PercentageBased => "percentage_based",
            AllocationStrategy::CustomPriority => "custom_priority",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fifo" => Some(AllocationStrategy::Fifo),
            "proportional" => Some(AllocationStrategy::Proportional),
            "overdue_first" => Some(AllocationStrategy::OverdueFirst),
            "largest_first" => Some(AllocationStrategy::LargestFirst),
            "equal_distribution" => Some(AllocationStrategy::EqualDistribution),
            "percentage_based" => Some(AllocationStrategy::PercentageBased),
            "custom_priority" => Some(AllocationStrategy::CustomPriority),
            _ => None,
        }
    }
}

/// Caller input for the strategies that need it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyOptions {
    /// Share of the available amount per invoice, in basis points
    pub basis_points: HashMap<Uuid, u32>,
    /// Invoices to pay first, in this order
    pub priority: Vec<Uuid>,
}

#[derive(Debug, Error, PartialEq)]
pub enum StrategyError {
    #[error("Percentage-based allocation needs at least one invoice percentage")]
    MissingPercentages,

    #[error("Percentage for invoice {0} must be greater than 0 and at most 100")]
    InvalidPercentage(Uuid),

    #[error("Invoice {0} is given more than one percentage")]
    DuplicatePercentage(Uuid),

    #[error("Percentages add up to {0} basis points, more than 100%")]
    PercentagesExceedWhole(u32),

    #[error("Custom priority allocation needs an invoice order")]
    MissingPriority,

    #[error("Invoice {0} appears more than once in the priority order")]
    DuplicatePriority(Uuid),
}

/// Percent to basis points, keeping two decimals; `None` outside (0, 100]
pub fn percent_to_basis_points(percent: f64) -> Option<u32> {
    if !percent.is_finite() || percent <= 0.0 || percent > 100.0 {
        return None;
    }
    let bp = (percent * 100.0).round() as u32;
    (bp > 0).then_some(bp)
}

impl StrategyOptions {
    /// Build options from `(invoice, percent)` pairs and a priority order,
    /// checking them against what `strategy` needs.
    pub fn build(
        strategy: AllocationStrategy,
        percentages: &[(Uuid, f64)],
        priority: &[Uuid],
    ) -> Result<Self, StrategyError> {
        let mut basis_points = HashMap::with_capacity(percentages.len());
        let mut total: u32 = 0;
        for &(invoice_id, percent) in percentages {
            let bp = percent_to_basis_points(percent)
                .ok_or(StrategyError::InvalidPercentage(invoice_id))?;
            if basis_points.insert(invoice_id, bp).is_some() {
                return Err(StrategyError::DuplicatePercentage(invoice_id));
            }
            total = total.saturating_add(bp);
        }
        if total > FULL_BASIS_POINTS {
            return Err(StrategyError::PercentagesExceedWhole(total));
        }

        let mut seen = HashSet::with_capacity(priority.len());
        for id in priority {
            if !seen.insert(*id) {
                return Err(StrategyError::DuplicatePriority(*id));
            }
        }

        match strategy {
            AllocationStrategy::PercentageBased if basis_points.is_empty() => {
                Err(StrategyError::MissingPercentages)
            }
            AllocationStrategy::CustomPriority if priority.is_empty() => {
                Err(StrategyError::MissingPriority)
            }
            _ => Ok(Self {
                basis_points,
                priority: priority.to_vec(),
            }),
        }
    }
}

/// The fields of an open invoice the planner looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenInvoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub balance_minor: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedAllocation {
    pub invoice_id: Uuid,
    pub amount_minor: i64,
}

/// Plan allocations of `available_minor` across `invoices`.
///
/// `today` decides which invoices are overdue. Percentage-based and custom
/// priority plans read `options`; the other strategies ignore it.
pub fn plan_allocations(
    strategy: AllocationStrategy,
    options: &StrategyOptions,
    invoices: &[OpenInvoice],
    available_minor: i64,
    today: NaiveDate,
) -> Vec<PlannedAllocation> {
    let mut open: Vec<&OpenInvoice> = invoices.iter().filter(|i| i.balance_minor > 0).collect();
    if open.is_empty() || available_minor <= 0 {
        return Vec::new();
    }

    by_due_date(&mut open);

    match strategy {
        AllocationStrategy::Fifo => greedy(&open, available_minor),
        AllocationStrategy::LargestFirst => {
            open.sort_by(|a, b| b.balance_minor.cmp(&a.balance_minor));
            greedy(&open, available_minor)
        }
        AllocationStrategy::OverdueFirst => {
            let (mut overdue, rest): (Vec<&OpenInvoice>, Vec<&OpenInvoice>) =
                open.into_iter().partition(|i| i.due_date < today);
            // Days overdue descending; ties go to the larger balance.
            overdue.sort_by(|a, b| {
                a.due_date
                    .cmp(&b.due_date)
                    .then(b.balance_minor.cmp(&a.balance_minor))
            });
            overdue.extend(rest);
            greedy(&overdue, available_minor)
        }
        AllocationStrategy::Proportional => proportional(&open, available_minor),
        AllocationStrategy::EqualDistribution => equal_distribution(&open, available_minor),
        AllocationStrategy::PercentageBased => {
            percentage_based(&open, &options.basis_points, available_minor)
        }
        AllocationStrategy::CustomPriority => {
            let rank: HashMap<Uuid, usize> = options
                .priority
                .iter()
                .enumerate()
                .map(|(idx, id)| (*id, idx))
                .collect();
            // Stable: unlisted invoices keep due-date order after the listed ones
            open.sort_by_key(|i| rank.get(&i.invoice_id).copied().unwrap_or(usize::MAX));
            greedy(&open, available_minor)
        }
    }
}

/// Stable base order: due date, then issue date, then number
fn by_due_date(invoices: &mut [&OpenInvoice]) {
    invoices.sort_by(|a, b| {
        a.due_date
            .cmp(&b.due_date)
            .then(a.issue_date.cmp(&b.issue_date))
            .then(a.invoice_number.cmp(&b.invoice_number))
    });
}

fn greedy(ordered: &[&OpenInvoice], available_minor: i64) -> Vec<PlannedAllocation> {
    let mut remaining = available_minor;
    let mut plan = Vec::new();
    for invoice in ordered {
        if remaining == 0 {
            break;
        }
        let amount = remaining.min(invoice.balance_minor);
        plan.push(PlannedAllocation {
            invoice_id: invoice.invoice_id,
            amount_minor: amount,
        });
        remaining -= amount;
    }
    plan
}

fn proportional(ordered: &[&OpenInvoice], available_minor: i64) -> Vec<PlannedAllocation> {
    // i128 so that many large balances cannot overflow the denominator
    let total: i128 = ordered.iter().map(|i| i.balance_minor as i128).sum();
    if available_minor as i128 >= total {
        return ordered
            .iter()
            .map(|i| PlannedAllocation {
                invoice_id: i.invoice_id,
                amount_minor: i.balance_minor,
            })
            .collect();
    }

    let mut shares: Vec<i64> = ordered
        .iter()
        .map(|i| ((available_minor as i128 * i.balance_minor as i128) / total) as i64)
        .collect();

    // Floors leave fewer cents than invoices; hand them out in due-date order.
    let mut leftover = available_minor - shares.iter().sum::<i64>();
    for (share, invoice) in shares.iter_mut().zip(ordered) {
        if leftover == 0 {
            break;
        }
        if *share < invoice.balance_minor {
            *share += 1;
            leftover -= 1;
        }
    }

    to_plan(ordered, &shares)
}

fn equal_distribution(ordered: &[&OpenInvoice], available_minor: i64) -> Vec<PlannedAllocation> {
    let count = ordered.len() as i64;
    let base = available_minor / count;
    let extra = available_minor % count;

    let shares: Vec<i64> = ordered
        .iter()
        .enumerate()
        .map(|(idx, invoice)| {
            let share = base + i64::from((idx as i64) < extra);
            share.min(invoice.balance_minor)
        })
        .collect();

    to_plan(ordered, &shares)
}

fn percentage_based(
    ordered: &[&OpenInvoice],
    basis_points: &HashMap<Uuid, u32>,
    available_minor: i64,
) -> Vec<PlannedAllocation> {
    let mut remaining = available_minor;
    let shares: Vec<i64> = ordered
        .iter()
        .map(|invoice| {
            let bp = basis_points.get(&invoice.invoice_id).copied().unwrap_or(0);
            let share = (available_minor as i128 * bp as i128 / FULL_BASIS_POINTS as i128) as i64;
            let share = share.min(invoice.balance_minor).min(remaining);
            remaining -= share;
            share
        })
        .collect();

    to_plan(ordered, &shares)
}

fn to_plan(ordered: &[&OpenInvoice], shares: &[i64]) -> Vec<PlannedAllocation> {
    ordered
        .iter()
        .zip(shares)
        .filter(|(_, share)| **share > 0)
        .map(|(invoice, share)| PlannedAllocation {
            invoice_id: invoice.invoice_id,
            amount_minor: *share,
        })
        .collect()
}
