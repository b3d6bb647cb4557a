use std::collections::{BTreeMap, HashMap};

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Call, Customer};

pub const TOP_CUSTOMER_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerStats {
    pub customer_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub company: Option<String>,
    pub total_calls: i64,
    pub total_duration: i64,
    pub total_satisfaction: f64,
    pub avg_duration: f64,
    pub avg_satisfaction: f64,
    pub last_call_date: Option<NaiveDateTime>,
}

impl CustomerStats {
    fn seed(customer: &Customer) -> Self {
        Self {
            customer_id: customer.id,
            name: customer.name.clone(),
            email: customer.email.clone(),
            company: customer.company.clone(),
            total_calls: 0,
            total_duration: 0,
            total_satisfaction: 0.0,
            avg_duration: 0.0,
            avg_satisfaction: 0.0,
            last_call_date: None,
        }
    }

    fn record(&mut self, call: &Call) {
        self.total_calls += 1;
        self.total_duration += i64::from(call.duration);
        self.total_satisfaction += call.satisfaction_score.unwrap_or(0.0);
        self.last_call_date = match self.last_call_date {
            Some(current) if current >= call.date => Some(current),
            _ => Some(call.date),
        };
    }

    fn finish(&mut self) {
        if self.total_calls > 0 {
            let count = self.total_calls as f64;
            self.avg_duration = self.total_duration as f64 / count;
            self.avg_satisfaction = self.total_satisfaction / count;
        }
    }
}

/// One entry per customer, in `customers` order. Calls for customers not in
/// `customers` are ignored.
pub fn aggregate_customer_stats(customers: &[Customer], calls: &[Call]) -> Vec<CustomerStats> {
    let mut stats: Vec<CustomerStats> = customers.iter().map(CustomerStats::seed).collect();
    let index: HashMap<Uuid, usize> = stats
        .iter()
        .enumerate()
        .map(|(position, entry)| (entry.customer_id, position))
        .collect();

    for call in calls {
        if let Some(&position) = index.get(&call.customer_id) {
            stats[position].record(call);
        }
    }

    for entry in &mut stats {
        entry.finish();
    }
    stats
}

/// The busiest customers by call count; ties go to the most recent caller,
/// then name.
pub fn top_customers(customers: &[Customer], calls: &[Call]) -> Vec<CustomerStats> {
    let mut stats = aggregate_customer_stats(customers, calls);
    stats.retain(|entry| entry.total_calls > 0);
    stats.sort_by(|a, b| {
        b.total_calls
            .cmp(&a.total_calls)
            .then_with(|| b.last_call_date.cmp(&a.last_call_date))
            .then_with(|| a.name.cmp(&b.name))
    });
    stats.truncate(TOP_CUSTOMER_LIMIT);
    stats
}

/// Counts per calendar day over the `window_days` days ending with `today`.
/// Every day in the window is present, including days without calls.
pub fn calls_per_day(calls: &[Call], window_days: u32, today: NaiveDate) -> BTreeMap<NaiveDate, i64> {
    let span = u64::from(window_days.max(1) - 1);
    let start = today.checked_sub_days(Days::new(span)).unwrap_or(NaiveDate::MIN);
    calls_per_day_between(calls, start, today)
}

/// Counts per calendar day over `[start, end]` inclusive.
pub fn calls_per_day_between(
    calls: &[Call],
    start: NaiveDate,
    end: NaiveDate,
) -> BTreeMap<NaiveDate, i64> {
    let mut buckets: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    if start > end {
        return buckets;
    }
    for day in start.iter_days().take_while(|day| *day <= end) {
        buckets.insert(day, 0);
    }
    for call in calls {
        if let Some(count) = buckets.get_mut(&call.date.date()) {
            *count += 1;
        }
    }
    buckets
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub total_calls: i64,
    pub total_duration: i64,
    pub avg_duration: f64,
    pub avg_satisfaction: Option<f64>,
    pub rated_calls: i64,
}

/// Headline numbers for a set of calls. Unrated calls do not drag the
/// satisfaction average down.
pub fn summarize_calls(calls: &[Call]) -> CallSummary {
    let total_calls = calls.len() as i64;
    let total_duration: i64 = calls.iter().map(|call| i64::from(call.duration)).sum();
    let ratings: Vec<f64> = calls
        .iter()
        .filter_map(|call| call.satisfaction_score)
        .collect();
    let rated_calls = ratings.len() as i64;

    CallSummary {
        total_calls,
        total_duration,
        avg_duration: if total_calls > 0 {
            total_duration as f64 / total_calls as f64
        } else {
            0.0
        },
        avg_satisfaction: (rated_calls > 0)
            .then(|| ratings.iter().sum::<f64>() / rated_calls as f64),
        rated_calls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(name: &str) -> Customer {
        let epoch = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("date");
        Customer {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: None,
            phone: None,
            company: None,
            created_at: epoch,
            updated_at: epoch,
        }
    }

    fn call(customer: &Customer, day: u32, duration: i32, satisfaction: Option<f64>) -> Call {
        let date = NaiveDate::from_ymd_opt(2024, 5, day)
            .and_then(|d| d.and_hms_opt(14, 30, 0))
            .expect("date");
        Call {
            id: Uuid::new_v4().to_string(),
            agent_id: Uuid::nil(),
            customer_id: customer.id,
            date,
            duration,
            audio_url: None,
            transcript: None,
            summary: None,
            satisfaction_score: satisfaction,
            tags: serde_json::json!([]),
            created_at: date,
            updated_at: date,
        }
    }

    #[test]
    fn aggregates_per_customer() {
        let a = customer("A");
        let b = customer("B");
        let calls = vec![
            call(&a, 1, 10, Some(5.0)),
            call(&a, 3, 20, Some(3.0)),
            call(&b, 2, 5, Some(0.0)),
        ];

        let stats = aggregate_customer_stats(&[a.clone(), b.clone()], &calls);

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].customer_id, a.id);
        assert_eq!(stats[0].total_calls, 2);
        assert_eq!(stats[0].avg_duration, 15.0);
        assert_eq!(stats[0].avg_satisfaction, 4.0);
        assert_eq!(stats[0].last_call_date, Some(calls[1].date));
        assert_eq!(stats[1].total_calls, 1);
        assert_eq!(stats[1].avg_duration, 5.0);
        assert_eq!(stats[1].avg_satisfaction, 0.0);
    }

    #[test]
    fn customers_without_calls_have_zero_averages() {
        let quiet = customer("Quiet");
        let stats = aggregate_customer_stats(std::slice::from_ref(&quiet), &[]);

        assert_eq!(stats[0].total_calls, 0);
        assert_eq!(stats[0].avg_duration, 0.0);
        assert_eq!(stats[0].avg_satisfaction, 0.0);
        assert_eq!(stats[0].last_call_date, None);
    }

    #[test]
    fn missing_satisfaction_counts_as_zero() {
        let a = customer("A");
        let calls = vec![call(&a, 1, 10, Some(4.0)), call(&a, 2, 10, None)];

        let stats = aggregate_customer_stats(std::slice::from_ref(&a), &calls);
        assert_eq!(stats[0].avg_satisfaction, 2.0);
    }

    #[test]
    fn last_call_date_ignores_input_order() {
        let a = customer("A");
        let calls = vec![call(&a, 9, 10, None), call(&a, 2, 10, None)];

        let stats = aggregate_customer_stats(std::slice::from_ref(&a), &calls);
        assert_eq!(stats[0].last_call_date, Some(calls[0].date));
    }

    #[test]
    fn calls_per_day_zero_fills_the_window() {
        let a = customer("A");
        let today = NaiveDate::from_ymd_opt(2024, 5, 3).expect("date");
        let calls = vec![call(&a, 2, 10, None)];

        let per_day = calls_per_day(&calls, 3, today);

        assert_eq!(per_day.len(), 3);
        let counts: Vec<i64> = per_day.values().copied().collect();
        assert_eq!(counts, vec![0, 1, 0]);
        assert_eq!(
            per_day.keys().next().copied(),
            NaiveDate::from_ymd_opt(2024, 5, 1)
        );
    }

    #[test]
    fn calls_outside_the_range_are_ignored() {
        let a = customer("A");
        let start = NaiveDate::from_ymd_opt(2024, 5, 10).expect("date");
        let end = NaiveDate::from_ymd_opt(2024, 5, 12).expect("date");
        let calls = vec![call(&a, 9, 10, None), call(&a, 12, 10, None), call(&a, 13, 1, None)];

        let per_day = calls_per_day_between(&calls, start, end);

        assert_eq!(per_day.values().sum::<i64>(), 1);
        assert_eq!(per_day.get(&end), Some(&1));
        assert!(calls_per_day_between(&calls, end, start).is_empty());
    }

    #[test]
    fn top_customers_are_ranked_and_capped() {
        let customers: Vec<Customer> = (0..12).map(|i| customer(&format!("C{i:02}"))).collect();
        let mut calls = Vec::new();
        for (i, c) in customers.iter().enumerate() {
            for _ in 0..=i {
                calls.push(call(c, 1, 30, None));
            }
        }

        let top = top_customers(&customers, &calls);

        assert_eq!(top.len(), TOP_CUSTOMER_LIMIT);
        assert_eq!(top[0].name, "C11");
        assert_eq!(top[0].total_calls, 12);
        assert_eq!(top[9].name, "C02");
    }

    #[test]
    fn summary_averages_only_rated_calls() {
        let a = customer("A");
        let calls = vec![
            call(&a, 1, 10, Some(5.0)),
            call(&a, 1, 30, None),
            call(&a, 2, 20, Some(3.0)),
        ];

        let summary = summarize_calls(&calls);

        assert_eq!(summary.total_calls, 3);
        assert_eq!(summary.total_duration, 60);
        assert_eq!(summary.avg_duration, 20.0);
        assert_eq!(summary.avg_satisfaction, Some(4.0));
        assert_eq!(summary.rated_calls, 2);
        assert_eq!(summarize_calls(&[]).avg_satisfaction, None);
    }
}
