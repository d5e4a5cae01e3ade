//! Coach: insight mining, achievement/challenge ledger, and Tip Cache
//! (SPEC_FULL §4.9), grounded on `monitoring/mod.rs`'s
//! `Arc<Mutex<VecDeque<_>>>` bounded-buffer pattern for the Tip Cache.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};

use crate::agent::provider::{Message, Provider, Role};
use crate::analytics::AnalyticsStore;
use crate::history::{HistoryEntry, HistoryStore};

const TIP_CACHE_CAPACITY: usize = 20;

fn tip_ttl() -> chrono::Duration {
    chrono::Duration::hours(6)
}

/// A cached tip, generated by the agent and shown at most once per day.
#[derive(Debug, Clone, PartialEq)]
pub struct Tip {
    pub text: String,
    pub generated_at: chrono::DateTime<Utc>,
}

/// Bounded buffer of generated tips plus the set shown today, mirroring the
/// teacher's output-stream buffer shape but keyed by tip text rather than
/// timestamp ordering alone.
struct TipCache {
    tips: VecDeque<Tip>,
    shown_today: HashSet<String>,
    shown_day: Option<NaiveDate>,
}

impl TipCache {
    fn new() -> Self {
        Self {
            tips: VecDeque::new(),
            shown_today: HashSet::new(),
            shown_day: None,
        }
    }

    fn roll_day_if_needed(&mut self, today: NaiveDate) {
        if self.shown_day != Some(today) {
            self.shown_today.clear();
            self.shown_day = Some(today);
        }
    }

    fn is_stale(&self, now: chrono::DateTime<Utc>) -> bool {
        self.tips.len() < TIP_CACHE_CAPACITY
            || self
                .tips
                .front()
                .map(|t| now - t.generated_at > tip_ttl())
                .unwrap_or(true)
    }

    fn push(&mut self, tip: Tip) {
        self.tips.push_back(tip);
        while self.tips.len() > TIP_CACHE_CAPACITY {
            self.tips.pop_front();
        }
    }

    fn take_unshown(&mut self, today: NaiveDate, limit: usize) -> Vec<Tip> {
        self.roll_day_if_needed(today);
        let mut out = Vec::new();
        for tip in &self.tips {
            if out.len() >= limit {
                break;
            }
            if !self.shown_today.contains(&tip.text) {
                out.push(tip.clone());
            }
        }
        for tip in &out {
            self.shown_today.insert(tip.text.clone());
        }
        out
    }

    fn reset(&mut self) {
        self.tips.clear();
        self.shown_today.clear();
        self.shown_day = None;
    }
}

/// An achievement or challenge derived from fixed activity thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct Milestone {
    pub title: String,
    pub achieved: bool,
}

/// Data bundle `dashboard()` assembles for the (out-of-scope) external TUI
/// renderer.
#[derive(Debug, Clone)]
pub struct DashboardData {
    pub stats: String,
    pub achievements: Vec<Milestone>,
    pub tips: Vec<Tip>,
}

/// Mines History/Analytics into insights, tracks achievements/challenges,
/// and owns the Tip Cache.
pub struct Coach {
    history: std::sync::Arc<HistoryStore>,
    analytics: std::sync::Arc<AnalyticsStore>,
    provider: Box<dyn Provider>,
    tips: Mutex<TipCache>,
}

impl Coach {
    pub fn new(
        history: std::sync::Arc<HistoryStore>,
        analytics: std::sync::Arc<AnalyticsStore>,
        provider: Box<dyn Provider>,
    ) -> Self {
        Self {
            history,
            analytics,
            provider,
            tips: Mutex::new(TipCache::new()),
        }
    }

    /// Called after every shell execution; currently a pass-through hook
    /// since streaks/frequencies are derived on demand from History/Analytics
    /// rather than kept as separate mutable counters.
    pub fn notify_command(&self, _entry: &HistoryEntry) {}

    pub fn stats(&self) -> anyhow::Result<String> {
        let frequencies = self.analytics.command_frequencies()?;
        let daily = self.analytics.daily_activity()?;
        let total_history = self.history.all()?.len();

        let mut top: Vec<(&String, &usize)> = frequencies.iter().collect();
        top.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        let top_line = top
            .iter()
            .take(5)
            .map(|(cmd, count)| format!("{cmd} ({count})"))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "commands logged: {total_history}\nactive days: {}\ntop commands: {top_line}",
            daily.len()
        ))
    }

    pub fn achievements(&self) -> anyhow::Result<Vec<Milestone>> {
        let total = self.history.all()?.len();
        let streak = self.current_day_streak()?;
        Ok(vec![
            Milestone {
                title: "50 commands logged".to_string(),
                achieved: total >= 50,
            },
            Milestone {
                title: "200 commands logged".to_string(),
                achieved: total >= 200,
            },
            Milestone {
                title: "5-day streak".to_string(),
                achieved: streak >= 5,
            },
        ])
    }

    pub fn challenges(&self) -> anyhow::Result<Vec<Milestone>> {
        let total = self.history.all()?.len();
        let next_hundred = ((total / 100) + 1) * 100;
        Ok(vec![Milestone {
            title: format!("Reach {next_hundred} commands logged"),
            achieved: false,
        }])
    }

    fn current_day_streak(&self) -> anyhow::Result<usize> {
        let daily = self.analytics.daily_activity()?;
        let mut dates: Vec<NaiveDate> = daily
            .keys()
            .filter_map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .collect();
        dates.sort();
        dates.dedup();
        let mut streak = 0usize;
        let mut prev: Option<NaiveDate> = None;
        for date in dates.into_iter().rev() {
            match prev {
                None => streak = 1,
                Some(p) if p.pred_opt() == Some(date) => streak += 1,
                Some(_) => break,
            }
            prev = Some(date);
        }
        Ok(streak)
    }

    /// Up to `limit` not-yet-shown-today tips, generating fresh ones from
    /// the agent when the cache is under capacity or stale by TTL.
    pub async fn tips(&self, limit: usize) -> anyhow::Result<Vec<Tip>> {
        let now = Utc::now();
        let needs_refresh = self.tips.lock().unwrap().is_stale(now);
        if needs_refresh {
            if let Ok(text) = self.generate_tip().await {
                self.tips.lock().unwrap().push(Tip {
                    text,
                    generated_at: now,
                });
            }
        }
        Ok(self.tips.lock().unwrap().take_unshown(now.date_naive(), limit))
    }

    async fn generate_tip(&self) -> anyhow::Result<String> {
        let frequencies = self.analytics.command_frequencies().unwrap_or_default();
        let mut top: Vec<(&String, &usize)> = frequencies.iter().collect();
        top.sort_by(|a, b| b.1.cmp(a.1));
        let context = top
            .iter()
            .take(10)
            .map(|(cmd, _)| cmd.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let messages = vec![
            Message {
                role: Role::System,
                content: "Give one short, practical shell usage tip (under 20 words) based on \
                          the user's most frequent commands."
                    .to_string(),
                tool_calls: None,
                tool_call_id: None,
            },
            Message {
                role: Role::User,
                content: format!("Frequent commands: {context}"),
                tool_calls: None,
                tool_call_id: None,
            },
        ];
        let completion = self.provider.complete(&messages, &[], None).await?;
        Ok(completion.content.trim().to_string())
    }

    pub fn reset_tips(&self) {
        self.tips.lock().unwrap().reset();
    }

    pub async fn dashboard(&self) -> anyhow::Result<DashboardData> {
        Ok(DashboardData {
            stats: self.stats()?,
            achievements: self.achievements()?,
            tips: self.tips(TIP_CACHE_CAPACITY).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::provider::{Completion, StaticProvider};

    fn coach_with_replies(replies: Vec<Completion>) -> Coach {
        Coach::new(
            std::sync::Arc::new(HistoryStore::open_in_memory().unwrap()),
            std::sync::Arc::new(AnalyticsStore::open_in_memory().unwrap()),
            Box::new(StaticProvider::new("test-model", replies)),
        )
    }

    #[test]
    fn stats_summarizes_frequencies_and_activity() {
        let coach = coach_with_replies(Vec::new());
        coach.analytics.new_entry("a", "ls", "ls").unwrap();
        coach.analytics.new_entry("a", "ls", "ls").unwrap();
        let e = coach.history.start("ls", "/tmp").unwrap();
        coach.history.finish(&e, 0).unwrap();
        let stats = coach.stats().unwrap();
        assert!(stats.contains("commands logged: 1"));
        assert!(stats.contains("ls (2)"));
    }

    #[test]
    fn achievements_unlock_at_fifty_commands() {
        let coach = coach_with_replies(Vec::new());
        for i in 0..50 {
            let e = coach.history.start(&format!("cmd{i}"), "/tmp").unwrap();
            coach.history.finish(&e, 0).unwrap();
        }
        let achievements = coach.achievements().unwrap();
        let fifty = achievements.iter().find(|m| m.title.contains("50")).unwrap();
        assert!(fifty.achieved);
        let two_hundred = achievements.iter().find(|m| m.title.contains("200")).unwrap();
        assert!(!two_hundred.achieved);
    }

    #[tokio::test]
    async fn tips_generates_and_marks_shown_today() {
        let coach = coach_with_replies(vec![Completion {
            content: "Use `cd -` to jump back to the previous directory.".to_string(),
            tool_calls: Vec::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
        }]);
        let first = coach.tips(5).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = coach.tips(5).await.unwrap();
        assert!(second.is_empty(), "already shown today, should not repeat");
    }

    #[tokio::test]
    async fn reset_tips_clears_shown_state() {
        let coach = coach_with_replies(vec![Completion {
            content: "tip one".to_string(),
            tool_calls: Vec::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
        }]);
        let _ = coach.tips(5).await.unwrap();
        coach.reset_tips();
        assert!(coach.tips.lock().unwrap().tips.is_empty());
    }
}
