//! Billing reconciliation.
//!
//! Attaches daily unblended-cost history to instances whose expense records
//! have gone stale. Candidates are selected once per pass against a single
//! "today"; each candidate gets one trailing-window cost query. Failures
//! are contained: a provider or parse error costs at most one instance's
//! refresh, never the scan.

use chrono::{NaiveDate, Utc};
use domain_inventory::{Account, Expense};
use tracing::{debug, warn};

use crate::providers::{CostWindow, ProviderSession};

/// Result of one reconciliation pass over an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BillingOutcome {
    /// Instances selected for refresh
    pub candidates: usize,
    /// Daily expense rows attached
    pub expenses_recorded: usize,
    /// Instances skipped because of lookup or parse failures
    pub instances_failed: usize,
}

pub struct BillingReconciler {
    window_days: i64,
}

impl BillingReconciler {
    pub fn new(window_days: i64) -> Self {
        Self { window_days }
    }

    /// Refresh stale cost history across the account.
    pub async fn attach(&self, session: &dyn ProviderSession, account: &mut Account) -> BillingOutcome {
        self.attach_as_of(session, account, Utc::now().date_naive()).await
    }

    /// Refresh with an explicit reference day. Split out so the staleness
    /// rule is testable without the wall clock.
    pub async fn attach_as_of(
        &self,
        session: &dyn ProviderSession,
        account: &mut Account,
        today: NaiveDate,
    ) -> BillingOutcome {
        let window = CostWindow::trailing(today, self.window_days);

        // Candidate selection happens once, up front, against one date.
        let candidates: Vec<(String, String)> = account
            .clusters()
            .flat_map(|cluster| {
                cluster
                    .instances()
                    .iter()
                    .filter(|i| i.needs_expense_refresh(today))
                    .map(|i| (cluster.id.clone(), i.id.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut outcome = BillingOutcome {
            candidates: candidates.len(),
            ..Default::default()
        };

        for (cluster_id, instance_id) in candidates {
            let buckets = match session.query_daily_costs(&instance_id, window).await {
                Ok(buckets) => buckets,
                Err(e) => {
                    warn!(instance = %instance_id, error = %e, "Cost lookup failed, skipping instance");
                    outcome.instances_failed += 1;
                    continue;
                }
            };

            for bucket in buckets {
                // A bucket that cannot be parsed poisons the rest of this
                // instance's response; remaining buckets are dropped.
                let amount: f64 = match bucket.amount.parse() {
                    Ok(amount) => amount,
                    Err(_) => {
                        warn!(
                            instance = %instance_id,
                            amount = %bucket.amount,
                            "Unparseable cost amount, dropping remaining buckets"
                        );
                        outcome.instances_failed += 1;
                        break;
                    }
                };
                let date = match NaiveDate::parse_from_str(&bucket.period_start, "%Y-%m-%d") {
                    Ok(date) => date,
                    Err(_) => {
                        warn!(
                            instance = %instance_id,
                            period_start = %bucket.period_start,
                            "Unparseable cost period, dropping remaining buckets"
                        );
                        outcome.instances_failed += 1;
                        break;
                    }
                };

                // Negative amounts are rejected per record; the rest of the
                // window still applies.
                let expense = match Expense::new(&instance_id, amount, date) {
                    Ok(expense) => expense,
                    Err(e) => {
                        warn!(instance = %instance_id, error = %e, "Rejected expense record");
                        continue;
                    }
                };

                match account.record_expense(&cluster_id, &instance_id, expense) {
                    Ok(()) => outcome.expenses_recorded += 1,
                    Err(e) => {
                        debug!(instance = %instance_id, error = %e, "Could not attach expense");
                    }
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CostBucket, MockProviderSession, ProviderError};
    use domain_inventory::{tags, CloudProvider, Instance, InstanceStatus, Tag};
    use mockall::predicate::eq;

    fn account_with_instances(ids: &[&str]) -> Account {
        let mut account = Account::new("123", "dev-account", CloudProvider::Aws);
        let resolution = tags::resolve(&[Tag::new(
            "kubernetes.io/cluster/foo-ABCDE",
            "owned",
            ids[0],
        )]);
        for id in ids {
            let instance = Instance::new(
                *id,
                format!("node-{id}"),
                CloudProvider::Aws,
                "m5.large",
                "us-east-1a",
                InstanceStatus::Running,
                &resolution.cluster_id,
                1,
            )
            .unwrap();
            account.add_instance(instance, &resolution, "us-east-1");
        }
        account
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    #[tokio::test]
    async fn test_attaches_one_expense_per_daily_bucket() {
        let mut account = account_with_instances(&["i-1"]);
        let mut session = MockProviderSession::new();

        session
            .expect_query_daily_costs()
            .with(eq("i-1"), eq(CostWindow::trailing(today(), 14)))
            .returning(|_, _| {
                Ok(vec![
                    CostBucket {
                        period_start: "2025-01-01".to_string(),
                        amount: "4.50".to_string(),
                    },
                    CostBucket {
                        period_start: "2025-01-02".to_string(),
                        amount: "5.10".to_string(),
                    },
                ])
            });

        let outcome = BillingReconciler::new(14)
            .attach_as_of(&session, &mut account, today())
            .await;

        assert_eq!(outcome.candidates, 1);
        assert_eq!(outcome.expenses_recorded, 2);
        assert_eq!(outcome.instances_failed, 0);

        let cluster = account.get_cluster("foo-ABCDE").unwrap();
        let instance = &cluster.instances()[0];
        let expenses = instance.expenses();
        assert_eq!(expenses.len(), 2);
        assert_eq!(expenses[0].instance_id, "i-1");
        assert_eq!(expenses[0].amount, 4.50);
        assert_eq!(
            expenses[0].date,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
        assert_eq!(expenses[1].amount, 5.10);
    }

    #[tokio::test]
    async fn test_unparseable_bucket_drops_the_rest_of_the_instance() {
        let mut account = account_with_instances(&["i-1"]);
        let mut session = MockProviderSession::new();

        session.expect_query_daily_costs().returning(|_, _| {
            Ok(vec![
                CostBucket {
                    period_start: "2025-01-01".to_string(),
                    amount: "4.50".to_string(),
                },
                CostBucket {
                    period_start: "2025-01-02".to_string(),
                    amount: "not-a-number".to_string(),
                },
                CostBucket {
                    period_start: "2025-01-03".to_string(),
                    amount: "6.00".to_string(),
                },
            ])
        });

        let outcome = BillingReconciler::new(14)
            .attach_as_of(&session, &mut account, today())
            .await;

        // The first bucket landed, the rest of the response was dropped.
        assert_eq!(outcome.expenses_recorded, 1);
        assert_eq!(outcome.instances_failed, 1);
        let cluster = account.get_cluster("foo-ABCDE").unwrap();
        assert_eq!(cluster.instances()[0].expenses().len(), 1);
    }

    #[tokio::test]
    async fn test_negative_amount_is_rejected_but_window_continues() {
        let mut account = account_with_instances(&["i-1"]);
        let mut session = MockProviderSession::new();

        session.expect_query_daily_costs().returning(|_, _| {
            Ok(vec![
                CostBucket {
                    period_start: "2025-01-01".to_string(),
                    amount: "-2.00".to_string(),
                },
                CostBucket {
                    period_start: "2025-01-02".to_string(),
                    amount: "5.10".to_string(),
                },
            ])
        });

        let outcome = BillingReconciler::new(14)
            .attach_as_of(&session, &mut account, today())
            .await;

        assert_eq!(outcome.expenses_recorded, 1);
        let cluster = account.get_cluster("foo-ABCDE").unwrap();
        let expenses = cluster.instances()[0].expenses();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].amount, 5.10);
    }

    #[tokio::test]
    async fn test_instance_failure_does_not_stop_the_pass() {
        let mut account = account_with_instances(&["i-1", "i-2"]);
        let mut session = MockProviderSession::new();

        session
            .expect_query_daily_costs()
            .with(eq("i-1"), mockall::predicate::always())
            .returning(|_, _| Err(ProviderError::ApiError("throttled".to_string())));
        session
            .expect_query_daily_costs()
            .with(eq("i-2"), mockall::predicate::always())
            .returning(|_, _| {
                Ok(vec![CostBucket {
                    period_start: "2025-01-14".to_string(),
                    amount: "3.25".to_string(),
                }])
            });

        let outcome = BillingReconciler::new(14)
            .attach_as_of(&session, &mut account, today())
            .await;

        assert_eq!(outcome.candidates, 2);
        assert_eq!(outcome.instances_failed, 1);
        assert_eq!(outcome.expenses_recorded, 1);
    }

    #[tokio::test]
    async fn test_fresh_instances_are_not_queried() {
        let mut account = account_with_instances(&["i-1"]);
        account
            .record_expense(
                "foo-ABCDE",
                "i-1",
                Expense::new("i-1", 1.0, today()).unwrap(),
            )
            .unwrap();

        // No expectation on query_daily_costs: a call would panic the mock.
        let session = MockProviderSession::new();

        let outcome = BillingReconciler::new(14)
            .attach_as_of(&session, &mut account, today())
            .await;

        assert_eq!(outcome.candidates, 0);
        assert_eq!(outcome.expenses_recorded, 0);
    }
}
