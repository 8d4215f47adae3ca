use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::error::Error;

use crate::config::NotifyConfig;
use crate::remote::XLSX_MIME;

type MailResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Sends the "processed file ready" e-mail with the workbook attached
pub struct Mailer {
    smtp: SmtpTransport,
    from: String,
    to: String,
}

impl Mailer {
    pub fn new(config: &NotifyConfig) -> MailResult<Self> {
        let creds = Credentials::new(config.from.clone(), config.password.clone());

        let smtp = SmtpTransport::starttls_relay(&config.smtp_host)?
            .credentials(creds)
            .port(config.smtp_port)
            .build();

        Ok(Mailer {
            smtp,
            from: config.from.clone(),
            to: config.to.clone(),
        })
    }

    pub fn send_processed_file(&self, filename: &str, workbook: Vec<u8>) -> MailResult<()> {
        let email = build_notification(&self.from, &self.to, filename, workbook)?;
        self.smtp.send(&email)?;
        Ok(())
    }
}

/// Build the notification message without sending it
pub fn build_notification(
    from: &str,
    to: &str,
    filename: &str,
    workbook: Vec<u8>,
) -> MailResult<Message> {
    let content_type = ContentType::parse(XLSX_MIME).map_err(|e| e.to_string())?;
    let attachment = Attachment::new(filename.to_string()).body(workbook, content_type);

    let email = Message::builder()
        .from(from.parse()?)
        .to(to.parse()?)
        .subject("Processed File Ready")
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(format!(
                    "The file {} has been processed and is ready. Please find the attachment.",
                    filename
                )))
                .singlepart(attachment),
        )?;

    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_carries_attachment() {
        let email = build_notification(
            "extractor@example.com",
            "ops@example.com",
            "processed_data.xlsx",
            b"PK\x03\x04".to_vec(),
        )
        .unwrap();

        let raw = String::from_utf8_lossy(&email.formatted()).to_string();
        assert!(raw.contains("Subject: Processed File Ready"));
        assert!(raw.contains("processed_data.xlsx"));
        assert!(raw.contains("spreadsheetml"));
    }

    #[test]
    fn test_bad_address_is_rejected() {
        let result = build_notification("not an address", "ops@example.com", "x.xlsx", vec![]);
        assert!(result.is_err());
    }
}
