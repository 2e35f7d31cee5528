pub mod mail;
pub mod route;

pub use mail::{subject, MailTransport, OutgoingMail, SmtpMailer};
pub use route::route;

use console::style;
use std::io::{self, Write};

fn joined(addresses: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    addresses
        .into_iter()
        .map(|a| a.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Print what would have been mailed to one recipient.
pub fn write_dry_run(out: &mut dyn Write, mail: &OutgoingMail) -> io::Result<()> {
    writeln!(out, "{}", style(format!("** REPORT FOR AUTHOR {} **", mail.to)).bold())?;
    writeln!(out, "Subject: {}", mail.subject)?;
    if !mail.cc.is_empty() {
        writeln!(out, "CC: {}", joined(&mail.cc))?;
    }
    if !mail.reply_to.is_empty() {
        writeln!(out, "Reply-to: {}", joined(&mail.reply_to))?;
    }
    if !mail.attachments.is_empty() {
        writeln!(
            out,
            "Attachments: {}",
            joined(mail.attachments.iter().map(|p| p.display().to_string()))
        )?;
    }
    writeln!(out)?;
    writeln!(out, "{}", mail.body)?;
    writeln!(out)
}
