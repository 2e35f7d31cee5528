use crate::config::SmtpCredentials;
use crate::error::{FetchError, Result, WatchError};
use crate::model::{Address, NotificationPlan};
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

pub fn subject(date: &str) -> String {
    format!("Daily Code and Writing Productivity Report for {date}")
}

/// One message for one recipient, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Address,
    pub cc: BTreeSet<Address>,
    pub reply_to: BTreeSet<Address>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

impl OutgoingMail {
    pub fn from_plan(recipient: &str, plan: &NotificationPlan, date: &str) -> Self {
        Self {
            to: recipient.to_string(),
            cc: plan.cc.clone(),
            reply_to: plan.reply_to.clone(),
            subject: subject(date),
            body: plan.body.clone(),
            attachments: plan.attachments.iter().cloned().collect(),
        }
    }
}

pub trait MailTransport {
    fn send(&self, mail: &OutgoingMail) -> std::result::Result<(), FetchError>;
}

/// SMTP delivery: STARTTLS on 587, implicit TLS on 465, plain otherwise.
pub struct SmtpMailer {
    sender: Mailbox,
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(creds: &SmtpCredentials) -> Result<Self> {
        let sender: Mailbox = creds
            .sender_email
            .parse()
            .map_err(|e| WatchError::Mail(format!("sender '{}': {e}", creds.sender_email)))?;
        let login = Credentials::new(creds.sender_email.clone(), creds.sender_password.clone());

        let builder = match creds.smtp_port {
            587 => SmtpTransport::starttls_relay(&creds.smtp_server),
            465 => SmtpTransport::relay(&creds.smtp_server),
            _ => Ok(SmtpTransport::builder_dangerous(&creds.smtp_server)),
        }
        .map_err(|e| WatchError::Mail(format!("smtp server '{}': {e}", creds.smtp_server)))?;

        let transport = builder.port(creds.smtp_port).credentials(login).build();
        Ok(Self { sender, transport })
    }

    fn build(&self, mail: &OutgoingMail) -> std::result::Result<Message, FetchError> {
        let mailbox = |addr: &str| {
            addr.parse::<Mailbox>()
                .map_err(|e| FetchError::Transport(format!("address '{addr}': {e}")))
        };

        let mut builder = Message::builder()
            .from(self.sender.clone())
            .to(mailbox(&mail.to)?)
            .subject(mail.subject.clone());
        for cc in &mail.cc {
            builder = builder.cc(mailbox(cc)?);
        }
        for reply_to in &mail.reply_to {
            builder = builder.reply_to(mailbox(reply_to)?);
        }

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
        for path in &mail.attachments {
            let bytes = std::fs::read(path)
                .map_err(|e| FetchError::Transport(format!("attachment {}: {e}", path.display())))?;
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "chart.svg".to_string());
            let content_type = ContentType::parse("image/svg+xml")
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            // Charts always travel base64 encoded, whatever their bytes look like.
            let body = Body::new_with_encoding(bytes, ContentTransferEncoding::Base64)
                .map_err(|_| FetchError::Transport(format!("attachment {}: cannot encode", path.display())))?;
            parts = parts.singlepart(Attachment::new(filename).body(body, content_type));
        }

        builder
            .multipart(parts)
            .map_err(|e| FetchError::Transport(e.to_string()))
    }
}

impl MailTransport for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> std::result::Result<(), FetchError> {
        let message = self.build(mail)?;
        debug!(to = %mail.to, attachments = mail.attachments.len(), "sending report");
        self.transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| FetchError::Transport(format!("smtp: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(port: u16) -> SmtpCredentials {
        SmtpCredentials {
            smtp_server: "smtp.example.edu".into(),
            smtp_port: port,
            sender_email: "reports@example.edu".into(),
            sender_password: "secret".into(),
        }
    }

    fn mail(attachments: Vec<PathBuf>) -> OutgoingMail {
        let mut plan = NotificationPlan::default();
        plan.body = "Repository: paper\n".into();
        plan.cc.insert("f1@example.edu".into());
        plan.reply_to.insert("f1@example.edu".into());
        plan.attachments.extend(attachments);
        OutgoingMail::from_plan("studentA@example.edu", &plan, "2026-10-19")
    }

    #[test]
    fn subject_carries_report_date() {
        assert_eq!(
            subject("2026-10-19"),
            "Daily Code and Writing Productivity Report for 2026-10-19"
        );
    }

    #[test]
    fn message_has_headers_and_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let chart = dir.path().join("repo_stats_test.svg");
        std::fs::write(&chart, "<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap();

        let mailer = SmtpMailer::new(&creds(587)).unwrap();
        let raw = String::from_utf8(mailer.build(&mail(vec![chart])).unwrap().formatted()).unwrap();
        assert!(raw.contains("To: studentA@example.edu"));
        assert!(raw.contains("Cc: f1@example.edu"));
        assert!(raw.contains("Reply-To: f1@example.edu"));
        assert!(raw.contains("Subject: Daily Code and Writing Productivity Report for 2026-10-19"));
        assert!(raw.contains("Content-Disposition: attachment"));
        assert!(raw.contains("repo_stats_test.svg"));
        assert!(raw.contains("Content-Type: image/svg+xml"));
        assert!(raw.contains("Content-Transfer-Encoding: base64"));
        assert!(!raw.contains("<svg xmlns"));
    }

    #[test]
    fn missing_attachment_fails_that_mail() {
        let mailer = SmtpMailer::new(&creds(25)).unwrap();
        let result = mailer.build(&mail(vec![PathBuf::from("/nonexistent/chart.svg")]));
        assert!(matches!(result, Err(FetchError::Transport(_))));
    }

    #[test]
    fn bad_sender_is_rejected() {
        let mut bad = creds(465);
        bad.sender_email = "not an address".into();
        assert!(matches!(SmtpMailer::new(&bad), Err(WatchError::Mail(_))));
    }
}
