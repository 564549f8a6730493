use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use thiserror::Error;
use tracing::info;

use crate::{config::MailConfig, utils::escape_html};

pub const SENDER_NAME: &str = "MC Electrobike";

const STARTTLS_PORT: u16 = 587;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let builder = if config.port == STARTTLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.from.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from: Mailbox::new(Some(SENDER_NAME.to_string()), config.from.parse()?),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse()?)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)?;

        self.transport.send(message).await?;
        info!("Sent email to {}", email.to);

        Ok(())
    }
}

pub fn customer_verification(to: &str, name: &str, link: &str) -> Email {
    let link = escape_html(link);

    Email {
        to: to.to_string(),
        subject: "Confirme seu e-mail".to_string(),
        html: format!(
            "<h2>Confirme seu e-mail</h2>\
             <p>Olá, {}! Clique para confirmar:</p>\
             <p><a href=\"{link}\">{link}</a></p>\
             <p>Se não foi você, ignore.</p>",
            escape_html(name)
        ),
    }
}

pub fn admin_confirmation(to: &str, link: &str) -> Email {
    let link = escape_html(link);

    Email {
        to: to.to_string(),
        subject: "Confirmação de Conta".to_string(),
        html: format!(
            "<p>Confirme sua conta clicando no link: <a href=\"{link}\">{link}</a></p>"
        ),
    }
}
