use crate::model::{Address, NotificationPlan, RepositoryReport};
use std::collections::BTreeMap;

/// Fan repository reports out into one plan per `TO` recipient.
///
/// Reports without stats contribute nothing. Set-valued fields are unioned,
/// so the result does not depend on report order; bodies are appended in the
/// order the reports are given.
pub fn route(reports: &[RepositoryReport]) -> BTreeMap<Address, NotificationPlan> {
    let mut plans: BTreeMap<Address, NotificationPlan> = BTreeMap::new();
    for report in reports {
        let Some(stats) = &report.stats else {
            continue;
        };
        let notify = &report.descriptor.notify;
        let contribution = NotificationPlan {
            body: stats.body.clone(),
            cc: notify.cc.clone(),
            reply_to: notify.reply_to.clone(),
            attachments: report.attachments.clone(),
        };
        for recipient in &notify.to {
            plans
                .entry(recipient.clone())
                .or_default()
                .merge(&contribution);
        }
    }
    plans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AuthKind, ChangeUnit, DailySeries, NotifySpec, RepoStats, RepositoryDescriptor,
        RepositoryKind,
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn report(name: &str, to: &[&str], cc: &[&str], body: Option<&str>) -> RepositoryReport {
        let descriptor = RepositoryDescriptor {
            kind: RepositoryKind::Github,
            auth_kind: AuthKind::GithubPublic,
            name: name.into(),
            url: format!("https://github.com/lab/{name}"),
            notify: NotifySpec {
                to: set(to),
                cc: set(cc),
                reply_to: set(&["advisor@example.edu"]),
            },
        };
        match body {
            Some(body) => RepositoryReport {
                descriptor,
                stats: Some(RepoStats {
                    unit: ChangeUnit::Lines,
                    records: Vec::new(),
                    daily: DailySeries::default(),
                    body: body.into(),
                }),
                attachments: BTreeSet::from([PathBuf::from(format!("images/{name}.svg"))]),
            },
            None => RepositoryReport::skipped(descriptor),
        }
    }

    #[test]
    fn shared_recipient_gets_union_of_cc() {
        let reports = vec![
            report("repo1", &["studentA@example.edu"], &["f1@example.edu"], Some("one")),
            report("repo2", &["studentA@example.edu"], &["f2@example.edu"], Some("two")),
        ];
        let plans = route(&reports);
        let plan = &plans["studentA@example.edu"];
        assert_eq!(plan.cc, set(&["f1@example.edu", "f2@example.edu"]));
        assert_eq!(plan.reply_to, set(&["advisor@example.edu"]));
        assert_eq!(plan.attachments.len(), 2);
        assert_eq!(plan.body, "one\ntwo");
    }

    #[test]
    fn set_fields_do_not_depend_on_order() {
        let forward = vec![
            report("repo1", &["s@example.edu"], &["f1@example.edu"], Some("one")),
            report("repo2", &["s@example.edu"], &["f2@example.edu"], Some("two")),
        ];
        let backward: Vec<_> = forward.iter().rev().cloned().collect();
        let a = &route(&forward)["s@example.edu"];
        let b = &route(&backward)["s@example.edu"];
        assert_eq!(a.cc, b.cc);
        assert_eq!(a.attachments, b.attachments);
        assert_eq!(b.body, "two\none");
    }

    #[test]
    fn rerouting_merged_plans_is_idempotent() {
        let reports = vec![
            report("repo1", &["s@example.edu"], &["f1@example.edu"], Some("one")),
            report("repo1", &["s@example.edu"], &["f1@example.edu"], Some("one")),
        ];
        let first = route(&reports);
        let mut merged = first["s@example.edu"].clone();
        merged.merge(&first["s@example.edu"]);
        assert_eq!(merged.cc, first["s@example.edu"].cc);
        assert_eq!(merged.reply_to, first["s@example.edu"].reply_to);
        assert_eq!(merged.attachments, first["s@example.edu"].attachments);
    }

    #[test]
    fn failed_repository_contributes_nothing() {
        let reports = vec![
            report("broken", &["s@example.edu", "t@example.edu"], &["f9@example.edu"], None),
            report("fine", &["s@example.edu"], &[], Some("fine body")),
        ];
        let plans = route(&reports);
        assert_eq!(plans.len(), 1);
        let plan = &plans["s@example.edu"];
        assert_eq!(plan.body, "fine body");
        assert!(plan.cc.is_empty());
    }

    #[test]
    fn every_to_address_gets_its_own_plan() {
        let reports = vec![report("r", &["a@example.edu", "b@example.edu"], &[], Some("x"))];
        let plans = route(&reports);
        assert_eq!(plans.keys().cloned().collect::<Vec<_>>(), vec!["a@example.edu", "b@example.edu"]);
    }
}
