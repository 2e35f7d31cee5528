use crate::aggregate::aggregate;
use crate::chart;
use crate::context::RunContext;
use crate::docs::{document_id, estimate, RevisionSource};
use crate::error::{ConfigError, Result};
use crate::git::{remote_url, GitRepo, GitTransport};
use crate::model::{
    Address, ChangeRecord, ChangeUnit, DailySeries, NotificationPlan, RawChangeEvent, RepoStats,
    RepositoryDescriptor, RepositoryReport,
};
use crate::normalize::normalize_all;
use crate::notify::{route, write_dry_run, MailTransport, OutgoingMail};
use crate::report::format_repository;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// External services a run talks to. Documents are skipped when no
/// revision source is configured; without a mailer the run is a dry run.
pub struct Providers<'a> {
    pub git: &'a dyn GitTransport,
    pub docs: Option<&'a dyn RevisionSource>,
    pub mailer: Option<&'a dyn MailTransport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub repositories: usize,
    pub skipped: usize,
    pub recipients: usize,
    pub sent: usize,
    pub failed: usize,
}

struct Collected {
    unit: ChangeUnit,
    records: Vec<ChangeRecord>,
    daily: DailySeries,
}

fn collect_git(
    ctx: &RunContext,
    descriptor: &RepositoryDescriptor,
    transport: &dyn GitTransport,
) -> Result<Collected> {
    let url = remote_url(descriptor, ctx.credentials.git.as_ref())?;
    let local = ctx.settings.clone_path(descriptor);
    transport.sync(&url, &local)?;

    let repo = GitRepo::open(&local)?;
    let tip = repo.history_tip()?;
    let events: Vec<RawChangeEvent> = repo
        .collect_commits(tip)?
        .into_iter()
        .map(RawChangeEvent::GitCommit)
        .collect();
    let records = normalize_all(&events);
    let daily = chart::line_series(&records);
    Ok(Collected {
        unit: ChangeUnit::Lines,
        records,
        daily,
    })
}

fn collect_document(
    ctx: &RunContext,
    descriptor: &RepositoryDescriptor,
    source: Option<&dyn RevisionSource>,
) -> Result<Collected> {
    let doc_id = document_id(descriptor)?;
    let source = source.ok_or_else(|| ConfigError::MissingCredentials {
        name: descriptor.name.clone(),
        what: "google_service_account",
    })?;

    ctx.throttle.wait();
    let revisions = source.list_revisions(&doc_id)?;
    info!(repository = %descriptor.name, revisions = revisions.len(), "estimating word contributions");
    let contributions = estimate(source, &doc_id, &revisions, &ctx.throttle);

    let events: Vec<RawChangeEvent> = contributions
        .events
        .iter()
        .cloned()
        .map(RawChangeEvent::DriveRevision)
        .collect();
    Ok(Collected {
        unit: ChangeUnit::Words,
        records: normalize_all(&events),
        daily: chart::word_series(&contributions.by_author_day()),
    })
}

fn draw_chart(
    ctx: &RunContext,
    descriptor: &RepositoryDescriptor,
    unit: ChangeUnit,
    daily: &DailySeries,
) -> Result<PathBuf> {
    let path = chart::chart_path(&ctx.settings.images_dir)?;
    let (title, y_label) = match unit {
        ChangeUnit::Lines => (
            format!("Repository {}: Daily Insertions and Deletions per Author", descriptor.name),
            "Total Contributions",
        ),
        ChangeUnit::Words => (
            format!("{}: Word Contributions Over Time", descriptor.name),
            "Words Added",
        ),
    };
    chart::render(daily, &title, y_label, &path)?;
    Ok(path)
}

/// Fetch, normalize, aggregate and format one repository. Any failure
/// leaves the report without stats; the run carries on.
pub fn build_report(
    ctx: &RunContext,
    descriptor: &RepositoryDescriptor,
    providers: &Providers<'_>,
) -> RepositoryReport {
    info!(repository = %descriptor.name, kind = %descriptor.kind, "processing repository");
    let collected = if descriptor.is_document() {
        collect_document(ctx, descriptor, providers.docs)
    } else {
        collect_git(ctx, descriptor, providers.git)
    };
    let Collected { unit, records, daily } = match collected {
        Ok(collected) => collected,
        Err(e) => {
            warn!(repository = %descriptor.name, error = %e, "repository skipped");
            return RepositoryReport::skipped(descriptor.clone());
        }
    };

    let stats = aggregate(&records, &ctx.windows, ctx.now);

    let mut attachments = BTreeSet::new();
    if !daily.dates.is_empty() {
        match draw_chart(ctx, descriptor, unit, &daily) {
            Ok(path) => {
                attachments.insert(path);
            }
            Err(e) => warn!(repository = %descriptor.name, error = %e, "chart not rendered"),
        }
    }

    let body = format_repository(&descriptor.name, &stats, &ctx.windows, unit, !attachments.is_empty());
    info!(repository = %descriptor.name, records = records.len(), "repository processed");
    RepositoryReport {
        descriptor: descriptor.clone(),
        stats: Some(RepoStats {
            unit,
            records,
            daily,
            body,
        }),
        attachments,
    }
}

/// Send each plan, or print it when no mailer is configured. A failed send
/// is logged and counted; it does not stop the other recipients.
pub fn deliver(
    ctx: &RunContext,
    plans: &BTreeMap<Address, NotificationPlan>,
    mailer: Option<&dyn MailTransport>,
    out: &mut dyn Write,
) -> Result<RunSummary> {
    let date = ctx.report_date();
    let mut summary = RunSummary {
        recipients: plans.len(),
        ..RunSummary::default()
    };

    for (recipient, plan) in plans {
        let mail = OutgoingMail::from_plan(recipient, plan, &date);
        match mailer {
            Some(mailer) => match mailer.send(&mail) {
                Ok(()) => {
                    info!(to = %recipient, "report sent");
                    summary.sent += 1;
                }
                Err(e) => {
                    error!(to = %recipient, error = %e, "report not sent");
                    summary.failed += 1;
                }
            },
            None => write_dry_run(out, &mail)?,
        }
    }
    Ok(summary)
}

/// Remove generated charts. Failures are logged only.
pub fn cleanup(reports: &[RepositoryReport]) {
    for path in reports.iter().flat_map(|r| r.attachments.iter()) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "chart not removed");
        }
    }
}

pub fn run(
    ctx: &RunContext,
    descriptors: &[RepositoryDescriptor],
    providers: &Providers<'_>,
    out: &mut dyn Write,
) -> Result<RunSummary> {
    let reports: Vec<RepositoryReport> = descriptors
        .iter()
        .map(|descriptor| build_report(ctx, descriptor, providers))
        .collect();

    let plans = route(&reports);
    let delivered = deliver(ctx, &plans, providers.mailer, out);
    cleanup(&reports);

    let mut summary = delivered?;
    summary.repositories = reports.len();
    summary.skipped = reports.iter().filter(|r| r.stats.is_none()).count();
    info!(
        repositories = summary.repositories,
        skipped = summary.skipped,
        recipients = summary.recipients,
        sent = summary.sent,
        failed = summary.failed,
        "run finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_windows, Credentials, Settings};
    use crate::error::FetchError;
    use crate::model::{AuthKind, DriveRevision, NotifySpec, RepositoryKind};
    use chrono::{Duration, Local, TimeZone, Utc};
    use std::cell::RefCell;
    use std::path::Path;

    struct Unreachable;

    impl GitTransport for Unreachable {
        fn sync(&self, url: &str, _local_path: &Path) -> std::result::Result<(), FetchError> {
            Err(FetchError::Transport(format!("cannot reach {url}")))
        }
    }

    struct Doc {
        revisions: Vec<DriveRevision>,
    }

    impl RevisionSource for Doc {
        fn list_revisions(&self, _doc_id: &str) -> std::result::Result<Vec<DriveRevision>, FetchError> {
            Ok(self.revisions.clone())
        }

        fn fetch_text(&self, _doc_id: &str, revision_id: &str) -> std::result::Result<String, FetchError> {
            match revision_id {
                "1" => Ok("alpha beta".into()),
                "2" => Ok("alpha beta gamma delta".into()),
                _ => Err(FetchError::Status { code: 404, url: revision_id.into() }),
            }
        }
    }

    /// Records when each Drive call arrives.
    struct Timed {
        inner: Doc,
        calls: RefCell<Vec<std::time::Instant>>,
    }

    impl RevisionSource for Timed {
        fn list_revisions(&self, doc_id: &str) -> std::result::Result<Vec<DriveRevision>, FetchError> {
            self.calls.borrow_mut().push(std::time::Instant::now());
            self.inner.list_revisions(doc_id)
        }

        fn fetch_text(&self, doc_id: &str, revision_id: &str) -> std::result::Result<String, FetchError> {
            self.calls.borrow_mut().push(std::time::Instant::now());
            self.inner.fetch_text(doc_id, revision_id)
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: RefCell<Vec<OutgoingMail>>,
        reject: Option<&'static str>,
    }

    impl MailTransport for Recorder {
        fn send(&self, mail: &OutgoingMail) -> std::result::Result<(), FetchError> {
            if self.reject == Some(mail.to.as_str()) {
                return Err(FetchError::Transport("mailbox unavailable".into()));
            }
            self.sent.borrow_mut().push(mail.clone());
            Ok(())
        }
    }

    fn context(dir: &Path) -> RunContext {
        spaced_context(dir, std::time::Duration::ZERO)
    }

    fn spaced_context(dir: &Path, request_spacing: std::time::Duration) -> RunContext {
        let settings = Settings {
            repos_dir: dir.join("git_repos"),
            images_dir: dir.join("images"),
            request_spacing,
            windows: default_windows(),
        };
        let now = Local.with_ymd_and_hms(2026, 10, 19, 18, 0, 0).unwrap();
        RunContext::new(settings, Credentials::default(), now).unwrap()
    }

    fn descriptor(kind: RepositoryKind, auth_kind: AuthKind, name: &str, url: &str, to: &str) -> RepositoryDescriptor {
        RepositoryDescriptor {
            kind,
            auth_kind,
            name: name.into(),
            url: url.into(),
            notify: NotifySpec {
                to: [to.to_string()].into(),
                cc: ["f1@example.edu".to_string()].into(),
                reply_to: Default::default(),
            },
        }
    }

    fn thesis() -> RepositoryDescriptor {
        descriptor(
            RepositoryKind::GoogleDoc,
            AuthKind::GoogleServiceAccount,
            "Thesis",
            "https://docs.google.com/document/d/abc123/edit",
            "studentA@example.edu",
        )
    }

    fn doc_source(ctx: &RunContext) -> Doc {
        let recent = |hours: i64| Some((ctx.now - Duration::hours(hours)).with_timezone(&Utc));
        Doc {
            revisions: vec![
                DriveRevision {
                    id: "2".into(),
                    modified: recent(1),
                    author_name: Some("Ada".into()),
                    author_email: Some("ada@example.edu".into()),
                    size: None,
                },
                DriveRevision {
                    id: "1".into(),
                    modified: recent(3),
                    author_name: Some("Ada".into()),
                    author_email: Some("ada@example.edu".into()),
                    size: None,
                },
            ],
        }
    }

    #[test]
    fn document_report_counts_words_and_attaches_chart() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let source = doc_source(&ctx);
        let providers = Providers {
            git: &Unreachable,
            docs: Some(&source),
            mailer: None,
        };

        let report = build_report(&ctx, &thesis(), &providers);
        let stats = report.stats.as_ref().unwrap();
        assert_eq!(stats.unit, ChangeUnit::Words);
        assert_eq!(stats.records.len(), 2);
        assert!(stats.body.contains("ada@example.edu: 4 words added in 2 revisions"));
        assert_eq!(report.attachments.len(), 1);
        assert!(report.attachments.iter().all(|p| p.exists()));
        cleanup(&[report.clone()]);
        assert!(report.attachments.iter().all(|p| !p.exists()));
    }

    #[test]
    fn unreachable_remote_yields_no_stats() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let providers = Providers {
            git: &Unreachable,
            docs: None,
            mailer: None,
        };
        let repo = descriptor(
            RepositoryKind::Github,
            AuthKind::GithubPublic,
            "paper",
            "https://github.invalid/lab/paper",
            "studentA@example.edu",
        );
        assert!(build_report(&ctx, &repo, &providers).stats.is_none());

        let http = descriptor(RepositoryKind::Github, AuthKind::GithubPublic, "p", "http://x/y", "s@example.edu");
        assert!(build_report(&ctx, &http, &providers).stats.is_none());
    }

    #[test]
    fn document_without_service_account_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let providers = Providers {
            git: &Unreachable,
            docs: None,
            mailer: None,
        };
        assert!(build_report(&ctx, &thesis(), &providers).stats.is_none());
    }

    #[test]
    fn dry_run_prints_instead_of_sending() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let source = doc_source(&ctx);
        let providers = Providers {
            git: &Unreachable,
            docs: Some(&source),
            mailer: None,
        };
        let mut out = Vec::new();
        let summary = run(&ctx, &[thesis()], &providers, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(summary.recipients, 1);
        assert_eq!(summary.sent, 0);
        assert!(text.contains("studentA@example.edu"));
        assert!(text.contains("Repository: Thesis"));
        assert!(text.contains("Daily Code and Writing Productivity Report for 2026-10-19"));
        assert_eq!(std::fs::read_dir(dir.path().join("images")).unwrap().count(), 0);
    }

    #[test]
    fn notify_sends_one_mail_per_recipient_and_survives_failures() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let source = doc_source(&ctx);
        let mut other = thesis();
        other.notify.to = ["studentB@example.edu".to_string()].into();
        let recorder = Recorder {
            reject: Some("studentB@example.edu"),
            ..Recorder::default()
        };
        let providers = Providers {
            git: &Unreachable,
            docs: Some(&source),
            mailer: Some(&recorder),
        };

        let mut out = Vec::new();
        let summary = run(&ctx, &[thesis(), other], &providers, &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 1);
        let sent = recorder.sent.borrow();
        assert_eq!(sent[0].to, "studentA@example.edu");
        assert_eq!(sent[0].attachments.len(), 1);
    }

    #[test]
    fn failed_repository_adds_nothing_to_shared_recipient() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let source = doc_source(&ctx);
        let broken = descriptor(
            RepositoryKind::Github,
            AuthKind::GithubPublic,
            "broken",
            "https://github.invalid/lab/broken",
            "studentA@example.edu",
        );
        let providers = Providers {
            git: &Unreachable,
            docs: Some(&source),
            mailer: None,
        };
        let mut out = Vec::new();
        let summary = run(&ctx, &[broken, thesis()], &providers, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(!text.contains("Repository: broken"));
        assert!(text.contains("Repository: Thesis"));
    }

    #[test]
    fn request_spacing_holds_across_documents() {
        let dir = tempfile::tempdir().unwrap();
        let spacing = std::time::Duration::from_millis(40);
        let ctx = spaced_context(dir.path(), spacing);
        let source = Timed {
            inner: doc_source(&ctx),
            calls: RefCell::new(Vec::new()),
        };
        let providers = Providers {
            git: &Unreachable,
            docs: Some(&source),
            mailer: None,
        };
        let notes = descriptor(
            RepositoryKind::GoogleDoc,
            AuthKind::GoogleServiceAccount,
            "Notes",
            "https://docs.google.com/document/d/def456/edit",
            "studentB@example.edu",
        );
        run(&ctx, &[thesis(), notes], &providers, &mut std::io::sink()).unwrap();

        // One listing and two exports per document.
        let calls = source.calls.borrow();
        assert_eq!(calls.len(), 6);
        // Timestamps are taken after the throttle releases, so allow a little jitter.
        let floor = spacing - std::time::Duration::from_millis(10);
        for pair in calls.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= floor, "calls too close: {:?}", pair[1] - pair[0]);
        }
    }
}
