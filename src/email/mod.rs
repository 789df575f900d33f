//! Email retriever: pulls document attachments out of an IMAP inbox.
//!
//! The mailbox is opened read-only (`EXAMINE` + `BODY.PEEK`), so runs never
//! mark messages seen or otherwise mutate state. The sync IMAP client is
//! driven from a blocking task.

use chrono::{DateTime, TimeZone, Utc};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use tracing::{debug, info, warn};

use crate::config::EmailConfig;
use crate::error::{Error, Result};

/// Extensions accepted as invoice documents when the content type is not
/// conclusive.
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "csv", "png", "jpg", "jpeg", "tif", "tiff",
];

/// Content types accepted regardless of filename.
const DOCUMENT_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

/// One attachment pulled from a message.
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Message date, used to pick the filing month.
    pub message_date: DateTime<Utc>,
}

pub struct EmailRetriever;

impl EmailRetriever {
    /// Fetch document attachments from messages dated on or after `since`.
    ///
    /// Authentication failure is fatal for the channel; a single message
    /// that fails to parse is logged and skipped.
    pub async fn fetch_invoices(
        config: &EmailConfig,
        since: DateTime<Utc>,
    ) -> Result<Vec<EmailAttachment>> {
        let config = config.clone();
        tokio::task::spawn_blocking(move || fetch_blocking(&config, since))
            .await
            .map_err(|e| Error::Other(format!("IMAP task failed: {e}")))?
    }
}

fn fetch_blocking(config: &EmailConfig, since: DateTime<Utc>) -> Result<Vec<EmailAttachment>> {
    let tls = native_tls::TlsConnector::builder()
        .build()
        .map_err(|e| Error::Network(format!("TLS setup: {e}")))?;

    let client = imap::connect(
        (config.imap_server.as_str(), config.imap_port),
        config.imap_server.as_str(),
        &tls,
    )
    .map_err(|e| Error::Network(format!("IMAP connect to {}: {e}", config.imap_server)))?;

    let mut session = client
        .login(&config.address, &config.password)
        .map_err(|(e, _client)| Error::Auth(format!("IMAP login for {}: {e}", config.address)))?;

    // EXAMINE opens the mailbox read-only.
    session
        .examine("INBOX")
        .map_err(|e| Error::Network(format!("EXAMINE INBOX: {e}")))?;

    let query = format!("SINCE {}", since.format("%d-%b-%Y"));
    let ids = session
        .search(&query)
        .map_err(|e| Error::Network(format!("SEARCH {query}: {e}")))?;
    info!(
        mailbox = %config.address,
        messages = ids.len(),
        since = %since.format("%Y-%m-%d"),
        "searched inbox"
    );

    let mut attachments = Vec::new();
    for id in ids {
        // BODY.PEEK keeps the \Seen flag untouched.
        let fetches = match session.fetch(id.to_string(), "(INTERNALDATE BODY.PEEK[])") {
            Ok(fetches) => fetches,
            Err(e) => {
                warn!(message = id, "fetch failed, skipping: {e}");
                continue;
            }
        };
        for fetch in fetches.iter() {
            let Some(body) = fetch.body() else {
                debug!(message = id, "message without body, skipping");
                continue;
            };
            let fallback_date = fetch
                .internal_date()
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            match extract_attachments(body, fallback_date) {
                Ok(found) => attachments.extend(found),
                Err(e) => warn!(message = id, "unparsable message, skipping: {e}"),
            }
        }
    }

    if let Err(e) = session.logout() {
        debug!("IMAP logout failed: {e}");
    }

    Ok(attachments)
}

/// Parse a raw RFC822 message and collect its document attachments.
pub fn extract_attachments(
    raw: &[u8],
    fallback_date: DateTime<Utc>,
) -> Result<Vec<EmailAttachment>> {
    let mail =
        mailparse::parse_mail(raw).map_err(|e| Error::Extraction(format!("MIME parse: {e}")))?;

    let message_date = mail
        .headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok())
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
        .unwrap_or(fallback_date);

    let mut attachments = Vec::new();
    collect_parts(&mail, message_date, &mut attachments)?;
    Ok(attachments)
}

fn collect_parts(
    part: &ParsedMail<'_>,
    message_date: DateTime<Utc>,
    out: &mut Vec<EmailAttachment>,
) -> Result<()> {
    for sub in &part.subparts {
        collect_parts(sub, message_date, out)?;
    }
    if !part.subparts.is_empty() {
        return Ok(());
    }

    let disposition = part.get_content_disposition();
    let filename = disposition.params.get("filename").cloned().or_else(|| {
        part.ctype.params.get("name").cloned()
    });

    let is_attachment =
        disposition.disposition == DispositionType::Attachment || filename.is_some();
    if !is_attachment {
        return Ok(());
    }

    let filename = filename.unwrap_or_default();
    if !is_document_attachment(&filename, &part.ctype.mimetype) {
        debug!(filename = %filename, mimetype = %part.ctype.mimetype, "ignoring non-document attachment");
        return Ok(());
    }

    let bytes = part
        .get_body_raw()
        .map_err(|e| Error::Extraction(format!("attachment body: {e}")))?;
    out.push(EmailAttachment {
        filename,
        bytes,
        message_date,
    });
    Ok(())
}

/// Whether the attachment's name or content type suggests a document.
pub fn is_document_attachment(filename: &str, content_type: &str) -> bool {
    let content_type = content_type.to_lowercase();
    if DOCUMENT_CONTENT_TYPES.contains(&content_type.as_str()) {
        return true;
    }
    filename
        .rsplit_once('.')
        .map(|(_, ext)| DOCUMENT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVOICE_EMAIL: &str = concat!(
        "From: billing@vendor.test\r\n",
        "To: acct@acme.test\r\n",
        "Subject: Your invoice\r\n",
        "Date: Mon, 11 Mar 2024 10:00:00 +0000\r\n",
        "MIME-Version: 1.0\r\n",
        "Content-Type: multipart/mixed; boundary=\"sep\"\r\n",
        "\r\n",
        "--sep\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "Invoice attached.\r\n",
        "--sep\r\n",
        "Content-Type: application/pdf; name=\"invoice.pdf\"\r\n",
        "Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "JVBERi0xLjQ=\r\n",
        "--sep--\r\n",
    );

    #[test]
    fn extracts_pdf_attachment_with_message_date() {
        let attachments = extract_attachments(INVOICE_EMAIL.as_bytes(), Utc::now()).unwrap();
        assert_eq!(attachments.len(), 1);

        let attachment = &attachments[0];
        assert_eq!(attachment.filename, "invoice.pdf");
        assert_eq!(attachment.bytes, b"%PDF-1.4");
        assert_eq!(
            attachment.message_date,
            Utc.with_ymd_and_hms(2024, 3, 11, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn inline_text_parts_are_not_attachments() {
        let plain = concat!(
            "From: a@b.c\r\n",
            "Subject: hello\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "just words\r\n",
        );
        let attachments = extract_attachments(plain.as_bytes(), Utc::now()).unwrap();
        assert!(attachments.is_empty());
    }

    #[test]
    fn missing_date_header_uses_fallback() {
        let undated = concat!(
            "From: a@b.c\r\n",
            "Content-Type: multipart/mixed; boundary=\"x\"\r\n",
            "\r\n",
            "--x\r\n",
            "Content-Type: application/pdf\r\n",
            "Content-Disposition: attachment; filename=\"inv.pdf\"\r\n",
            "\r\n",
            "%PDF-1.4\r\n",
            "--x--\r\n",
        );
        let fallback = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let attachments = extract_attachments(undated.as_bytes(), fallback).unwrap();
        assert_eq!(attachments[0].message_date, fallback);
    }

    #[test]
    fn classifier_accepts_documents_by_extension_or_type() {
        assert!(is_document_attachment("invoice.pdf", "application/octet-stream"));
        assert!(is_document_attachment("INVOICE.PDF", "application/octet-stream"));
        assert!(is_document_attachment("scan.jpeg", "image/jpeg"));
        assert!(is_document_attachment("", "application/pdf"));
        assert!(is_document_attachment("report.xlsx", "application/octet-stream"));
    }

    #[test]
    fn classifier_rejects_non_documents() {
        assert!(!is_document_attachment("signature.asc", "application/pgp-signature"));
        assert!(!is_document_attachment("noext", "application/octet-stream"));
        assert!(!is_document_attachment("script.sh", "text/x-sh"));
    }
}
