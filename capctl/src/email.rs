//! Email service for enrollment confirmations.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use minijinja::{Environment, Value, context};
use serde::Serialize;
use std::path::Path;
use url::Url;

use crate::{
    api::models::{enrollments::EnrollmentReceipt, groups::GroupDayResponse},
    config::{Config, EmailTransportConfig},
    errors::Error,
};

const CONFIRMATION_TEMPLATE_NAME: &str = "enrollment_confirmation.html";
const CONFIRMATION_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif; color: #222;">
  <p>Hola {{ participant_name }},</p>
  <p>Tu inscripción a <strong>{{ course_name }}</strong>{% if group_name %} ({{ group_name }}){% endif %} quedó registrada.</p>
  {% if days %}
  <p>Fechas de cursada:</p>
  <ul>
    {% for day in days %}<li>{{ day }}</li>
    {% endfor %}
  </ul>
  {% endif %}
  <p>Concesionario: {{ dealer_name }}</p>
  <p><a href="{{ portal_url }}">{{ portal_url }}</a></p>
</body>
</html>
"#;

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    reply_to: Option<String>,
    public_url: String,
    templates: Environment<'static>,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
    Http {
        client: reqwest::Client,
        endpoint: Url,
        api_key: String,
    },
    Disabled,
}

/// Payload accepted by the transactional email provider
#[derive(Debug, Serialize)]
struct HttpEmail<'a> {
    from: String,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
            EmailTransportConfig::Http { endpoint, api_key } => match api_key {
                Some(api_key) => {
                    let client = reqwest::Client::builder().build().map_err(|e| Error::Internal {
                        operation: format!("create HTTP email client: {e}"),
                    })?;
                    EmailTransport::Http {
                        client,
                        endpoint: endpoint.clone(),
                        api_key: api_key.clone(),
                    }
                }
                None => {
                    tracing::warn!(%endpoint, "No email API key configured; confirmation emails will only be logged");
                    EmailTransport::Disabled
                }
            },
            EmailTransportConfig::Disabled => EmailTransport::Disabled,
        };

        let mut templates = Environment::new();
        templates
            .add_template(CONFIRMATION_TEMPLATE_NAME, CONFIRMATION_TEMPLATE)
            .map_err(|e| Error::Internal {
                operation: format!("load email template: {e}"),
            })?;

        Ok(Self {
            transport,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            reply_to: email_config.reply_to.clone(),
            public_url: config.public_url.clone(),
            templates,
        })
    }

    /// Whether messages actually leave the process
    pub fn is_enabled(&self) -> bool {
        !matches!(self.transport, EmailTransport::Disabled)
    }

    #[tracing::instrument(skip_all, fields(enrollment_id = %receipt.enrollment.id))]
    pub async fn send_enrollment_confirmation(&self, receipt: &EnrollmentReceipt) -> Result<(), Error> {
        let enrollment = &receipt.enrollment;
        let subject = format!("Inscripción confirmada: {}", receipt.course_name);
        let body = self.create_confirmation_body(receipt)?;

        self.send_email(
            &enrollment.participant_email,
            Some(&enrollment.participant_name),
            &subject,
            &body,
        )
        .await
    }

    fn create_confirmation_body(&self, receipt: &EnrollmentReceipt) -> Result<String, Error> {
        // Server-built values; HTML escaping would turn every `/` into `&#x2f;`
        let days: Vec<Value> = receipt
            .days
            .iter()
            .map(|day| Value::from_safe_string(describe_day(day)))
            .collect();

        self.templates
            .get_template(CONFIRMATION_TEMPLATE_NAME)
            .and_then(|template| {
                template.render(context! {
                    participant_name => &receipt.enrollment.participant_name,
                    course_name => &receipt.course_name,
                    group_name => &receipt.group_name,
                    dealer_name => &receipt.dealer_name,
                    days => days,
                    portal_url => Value::from_safe_string(self.public_url.clone()),
                })
            })
            .map_err(|e| Error::Internal {
                operation: format!("render confirmation email: {e}"),
            })
    }

    async fn send_email(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: &str) -> Result<(), Error> {
        match &self.transport {
            EmailTransport::Disabled => {
                tracing::info!(to = %to_email, subject, "Email sending disabled; message not sent");
                Ok(())
            }
            EmailTransport::Http {
                client,
                endpoint,
                api_key,
            } => {
                let payload = HttpEmail {
                    from: format!("{} <{}>", self.from_name, self.from_email),
                    to: to_email,
                    subject,
                    html: body,
                    reply_to: self.reply_to.as_deref(),
                };
                let response = client
                    .post(endpoint.clone())
                    .bearer_auth(api_key)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| Error::Internal {
                        operation: format!("send HTTP email: {e}"),
                    })?;

                if !response.status().is_success() {
                    return Err(Error::Internal {
                        operation: format!("send HTTP email: provider returned {}", response.status()),
                    });
                }
                Ok(())
            }
            EmailTransport::Smtp(smtp) => {
                let message = self.build_message(to_email, to_name, subject, body)?;
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
                Ok(())
            }
            EmailTransport::File(file) => {
                let message = self.build_message(to_email, to_name, subject, body)?;
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
                Ok(())
            }
        }
    }

    fn build_message(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: &str) -> Result<Message, Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = if let Some(name) = to_name {
            format!("{name} <{to_email}>")
        } else {
            to_email.to_string()
        }
        .parse::<Mailbox>()
        .map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let mut builder = Message::builder().from(from).to(to).subject(subject);
        if let Some(reply_to) = &self.reply_to {
            let reply_to = reply_to.parse::<Mailbox>().map_err(|e| Error::Internal {
                operation: format!("parse reply-to email: {e}"),
            })?;
            builder = builder.reply_to(reply_to);
        }

        builder
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })
    }
}

/// `dd/mm/yyyy`, with the time window when one is set
fn describe_day(day: &GroupDayResponse) -> String {
    let date = day.day.format("%d/%m/%Y");
    match (day.start_time, day.end_time) {
        (Some(start), Some(end)) => format!("{date} {}-{}", start.format("%H:%M"), end.format("%H:%M")),
        (Some(start), None) => format!("{date} {}", start.format("%H:%M")),
        _ => date.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::enrollments::{AttendanceStatus, EnrollmentResponse},
        test_utils::create_test_config,
    };
    use chrono::{NaiveDate, NaiveTime, Utc};
    use uuid::Uuid;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    fn receipt() -> EnrollmentReceipt {
        let now = Utc::now();
        EnrollmentReceipt {
            enrollment: EnrollmentResponse {
                id: Uuid::new_v4(),
                group_id: Uuid::new_v4(),
                dealer_id: Uuid::new_v4(),
                mechanic_id: None,
                participant_name: "Juan Pérez".to_string(),
                participant_email: "juan@example.com".to_string(),
                phone: None,
                notes: None,
                attendance: AttendanceStatus::Pending,
                created_at: now,
                updated_at: now,
            },
            course_id: Uuid::new_v4(),
            course_name: "Frenos ABS".to_string(),
            group_name: Some("Turno mañana".to_string()),
            dealer_name: "Motores del Sur".to_string(),
            days: vec![
                GroupDayResponse {
                    id: Uuid::new_v4(),
                    day: NaiveDate::from_ymd_opt(2025, 4, 7).unwrap(),
                    start_time: NaiveTime::from_hms_opt(9, 0, 0),
                    end_time: NaiveTime::from_hms_opt(13, 0, 0),
                },
                GroupDayResponse {
                    id: Uuid::new_v4(),
                    day: NaiveDate::from_ymd_opt(2025, 4, 8).unwrap(),
                    start_time: None,
                    end_time: None,
                },
            ],
            remaining_capacity: 3,
        }
    }

    #[test]
    fn test_confirmation_body() {
        let config = create_test_config();
        let service = EmailService::new(&config).unwrap();

        let body = service.create_confirmation_body(&receipt()).unwrap();

        assert!(body.contains("Hola Juan Pérez,"));
        assert!(body.contains("<strong>Frenos ABS</strong> (Turno mañana)"));
        assert!(body.contains("<li>07/04/2025 09:00-13:00</li>"));
        assert!(body.contains("<li>08/04/2025</li>"));
        assert!(body.contains("Motores del Sur"));
        assert!(body.contains(&format!("<a href=\"{url}\">{url}</a>", url = config.public_url)));
    }

    #[test]
    fn test_confirmation_body_escapes_html() {
        let config = create_test_config();
        let service = EmailService::new(&config).unwrap();
        let mut receipt = receipt();
        receipt.enrollment.participant_name = "<script>x</script>".to_string();

        let body = service.create_confirmation_body(&receipt).unwrap();
        assert!(!body.contains("<script>"));
        assert!(body.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn test_disabled_transport_succeeds() {
        let config = create_test_config();
        let service = EmailService::new(&config).unwrap();
        assert!(!service.is_enabled());
        service.send_enrollment_confirmation(&receipt()).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_transport_writes_message() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.email.transport = EmailTransportConfig::File {
            path: dir.path().to_string_lossy().to_string(),
        };
        config.email.reply_to = Some("cursos@example.com".to_string());
        let service = EmailService::new(&config).unwrap();

        service.send_enrollment_confirmation(&receipt()).await.unwrap();

        let written: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "eml"))
            .collect();
        assert_eq!(written.len(), 1);

        let contents = std::fs::read_to_string(&written[0]).unwrap();
        assert!(contents.contains("juan@example.com"));
        assert!(contents.contains("Reply-To: cursos@example.com"));
    }

    #[tokio::test]
    async fn test_http_transport_posts_json() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer key-123"))
            .and(body_partial_json(serde_json::json!({
                "to": "juan@example.com",
                "subject": "Inscripción confirmada: Frenos ABS",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = create_test_config();
        config.email.transport = EmailTransportConfig::Http {
            endpoint: Url::parse(&format!("{}/send", server.uri())).unwrap(),
            api_key: Some("key-123".to_string()),
        };
        let service = EmailService::new(&config).unwrap();
        assert!(service.is_enabled());

        service.send_enrollment_confirmation(&receipt()).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_transport_reports_provider_failure() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut config = create_test_config();
        config.email.transport = EmailTransportConfig::Http {
            endpoint: Url::parse(&server.uri()).unwrap(),
            api_key: Some("key-123".to_string()),
        };
        let service = EmailService::new(&config).unwrap();

        let err = service.send_enrollment_confirmation(&receipt()).await.unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
    }

    #[test]
    fn test_http_without_key_degrades_to_disabled() {
        let mut config = create_test_config();
        config.email.transport = EmailTransportConfig::Http {
            endpoint: Url::parse("https://mail.example.com/send").unwrap(),
            api_key: None,
        };
        let service = EmailService::new(&config).unwrap();
        assert!(!service.is_enabled());
    }
}
