use crate::core::config::SmtpConfig;
use crate::core::invoice::InvoiceDocument;
use crate::core::AppError;
use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use std::str::FromStr;

pub struct EmailService {
    smtp_config: SmtpConfig,
}

impl EmailService {
    pub fn new(smtp_config: SmtpConfig) -> Self {
        Self { smtp_config }
    }

    fn create_smtp_transport(&self) -> Result<SmtpTransport, AppError> {
        let credentials = Credentials::new(
            self.smtp_config.username.clone(),
            self.smtp_config.password.expose_secret().clone(),
        );

        // For Mailtrap (port 2525), use STARTTLS instead of direct TLS
        let mailer = if self.smtp_config.port == 2525 {
            SmtpTransport::starttls_relay(&self.smtp_config.host)
                .map_err(|e| {
                    AppError::internal_error(format!("Failed to create SMTP transport: {}", e))
                })?
                .port(self.smtp_config.port)
                .credentials(credentials)
                .build()
        } else {
            SmtpTransport::relay(&self.smtp_config.host)
                .map_err(|e| {
                    AppError::internal_error(format!("Failed to create SMTP transport: {}", e))
                })?
                .port(self.smtp_config.port)
                .credentials(credentials)
                .build()
        };

        Ok(mailer)
    }

    pub async fn send_subscription_invoice(
        &self,
        to_email: &str,
        invoice: &InvoiceDocument,
        pdf_bytes: Vec<u8>,
    ) -> Result<(), AppError> {
        let from_mailbox = Mailbox::from_str(&format!(
            "{} <{}>",
            self.smtp_config.from_name, self.smtp_config.from_email
        ))
        .map_err(|e| AppError::internal_error(format!("Invalid from email: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to_email)
            .map_err(|e| AppError::internal_error(format!("Invalid to email: {}", e)))?;

        let subject = format!(
            "Your Rupie Times subscription invoice - {}",
            invoice.invoice_number
        );

        let pdf_content_type = ContentType::parse("application/pdf")
            .map_err(|e| AppError::internal_error(format!("Invalid attachment type: {}", e)))?;
        let attachment = Attachment::new(format!("invoice-{}.pdf", invoice.invoice_number))
            .body(pdf_bytes, pdf_content_type);

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::mixed()
                    .multipart(MultiPart::alternative_plain_html(
                        create_invoice_email_text(invoice),
                        create_invoice_email_body(invoice),
                    ))
                    .singlepart(attachment),
            )
            .map_err(|e| AppError::internal_error(format!("Failed to build email: {}", e)))?;

        let mailer = self.create_smtp_transport()?;

        match mailer.send(&email) {
            Ok(_) => {
                tracing::info!("Invoice email sent successfully to: {}", to_email);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to send invoice email to {}: {}", to_email, e);
                Err(AppError::internal_error(format!(
                    "Failed to send email: {}",
                    e
                )))
            }
        }
    }
}

fn create_invoice_email_text(invoice: &InvoiceDocument) -> String {
    let mut body = format!(
        "Thank you for subscribing to Rupie Times.\n\nInvoice {} ({})\n\n",
        invoice.invoice_number,
        invoice.issued_on_ist()
    );
    for line in &invoice.lines {
        body.push_str(&format!(
            "- {} ({}): Rs. {}\n",
            line.description,
            line.duration,
            line.amount_paid.with_scale(2)
        ));
    }
    body.push_str(&format!(
        "\nSubtotal: Rs. {}\nDiscount: Rs. {}\nGST: Rs. {}\nTotal: Rs. {}\n\nThe attached PDF is your tax invoice.\n",
        invoice.totals.subtotal.with_scale(2),
        invoice.totals.discount.with_scale(2),
        invoice.totals.tax_amount.with_scale(2),
        invoice.totals.total.with_scale(2),
    ));
    body
}

fn create_invoice_email_body(invoice: &InvoiceDocument) -> String {
    let mut rows = String::new();
    for line in &invoice.lines {
        rows.push_str(&format!(
            r#"<tr><td>{}</td><td>{}</td><td style="text-align:right">&#8377;{}</td></tr>"#,
            line.description,
            line.duration,
            line.amount_paid.with_scale(2)
        ));
    }

    format!(
        r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Rupie Times Invoice</title>
    <style>
        body {{
            font-family: Arial, sans-serif;
            line-height: 1.6;
            color: #333;
            max-width: 600px;
            margin: 0 auto;
            padding: 20px;
            background-color: #f4f4f4;
        }}
        .container {{
            background-color: white;
            padding: 30px;
            border-radius: 10px;
            box-shadow: 0 0 10px rgba(0,0,0,0.1);
        }}
        .masthead {{
            font-size: 24px;
            font-weight: bold;
            color: #1a3c6e;
            text-align: center;
            margin-bottom: 10px;
        }}
        table {{
            width: 100%;
            border-collapse: collapse;
            margin: 20px 0;
        }}
        th, td {{
            border-bottom: 1px solid #eee;
            padding: 8px;
            text-align: left;
        }}
        .totals td {{
            border: none;
            padding: 4px 8px;
        }}
        .footer {{
            margin-top: 30px;
            padding-top: 20px;
            border-top: 1px solid #eee;
            font-size: 12px;
            color: #666;
            text-align: center;
        }}
    </style>
</head>
<body>
    <div class="container">
        <div class="masthead">&#128240; Rupie Times</div>
        <h2>Thank you, {name}!</h2>
        <p>Your payment was received and your subscriptions are ready. Invoice <strong>{number}</strong>, issued {issued}.</p>
        <table>
            <tr><th>Subscription</th><th>Duration</th><th style="text-align:right">Paid</th></tr>
            {rows}
        </table>
        <table class="totals">
            <tr><td>Subtotal</td><td style="text-align:right">&#8377;{subtotal}</td></tr>
            <tr><td>Discount</td><td style="text-align:right">- &#8377;{discount}</td></tr>
            <tr><td>GST</td><td style="text-align:right">&#8377;{tax}</td></tr>
            <tr><td><strong>Total</strong></td><td style="text-align:right"><strong>&#8377;{total}</strong></td></tr>
        </table>
        <p>The attached PDF is your tax invoice for this order.</p>
        <div class="footer">
            <p>This is an automated message from Rupie Times. Please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>
"#,
        name = invoice.customer.name,
        number = invoice.invoice_number,
        issued = invoice.issued_on_ist(),
        rows = rows,
        subtotal = invoice.totals.subtotal.with_scale(2),
        discount = invoice.totals.discount.with_scale(2),
        tax = invoice.totals.tax_amount.with_scale(2),
        total = invoice.totals.total.with_scale(2),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::invoice::{compute_order_totals, InvoiceCustomer, InvoiceLine};
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, Utc};
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;
    use std::str::FromStr;

    fn sample_invoice() -> InvoiceDocument {
        InvoiceDocument {
            invoice_number: "order_Mz1aBcDeFgHiJk".to_string(),
            issued_at: DateTime::parse_from_rfc3339("2024-01-15T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            customer: InvoiceCustomer {
                name: "Test Reader".to_string(),
                email: SafeEmail().fake(),
            },
            lines: vec![InvoiceLine {
                description: "Market Pulse Daily".to_string(),
                duration: "1 Month".to_string(),
                original_price: BigDecimal::from_str("100").unwrap(),
                amount_paid: BigDecimal::from_str("100").unwrap(),
            }],
            totals: compute_order_totals(
                BigDecimal::from_str("100").unwrap(),
                BigDecimal::from(0),
                18,
            ),
            promo_code: None,
        }
    }

    #[test]
    fn the_html_body_carries_the_invoice_number_and_totals() {
        let html = create_invoice_email_body(&sample_invoice());
        assert!(html.contains("order_Mz1aBcDeFgHiJk"));
        assert!(html.contains("118.00"));
        assert!(html.contains("Market Pulse Daily"));
    }

    #[test]
    fn the_plain_text_alternative_lists_every_line() {
        let text = create_invoice_email_text(&sample_invoice());
        assert!(text.contains("Market Pulse Daily"));
        assert!(text.contains("Total: Rs. 118.00"));
    }
}
