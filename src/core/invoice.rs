use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use chrono_tz::Asia::Kolkata;
use once_cell::sync::Lazy;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};

static HUNDRED: Lazy<BigDecimal> = Lazy::new(|| BigDecimal::from(100));

#[derive(Debug, Clone)]
pub struct InvoiceCustomer {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct InvoiceLine {
    pub description: String,
    pub duration: String,
    pub original_price: BigDecimal,
    pub amount_paid: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct InvoiceDocument {
    pub invoice_number: String,
    pub issued_at: DateTime<Utc>,
    pub customer: InvoiceCustomer,
    pub lines: Vec<InvoiceLine>,
    pub totals: OrderTotals,
    pub promo_code: Option<String>,
}

impl InvoiceDocument {
    /// Issue timestamp the way it appears on the invoice, in IST.
    pub fn issued_on_ist(&self) -> String {
        self.issued_at
            .with_timezone(&Kolkata)
            .format("%d %b %Y, %I:%M %p IST")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTotals {
    pub subtotal: BigDecimal,
    pub discount: BigDecimal,
    pub taxable_amount: BigDecimal,
    pub tax_amount: BigDecimal,
    pub total: BigDecimal,
}

/// GST-style order totals: the discount comes off first, tax applies to what
/// remains, and a discount larger than the subtotal never drives the taxable
/// amount negative.
pub fn compute_order_totals(
    subtotal: BigDecimal,
    discount: BigDecimal,
    tax_rate_percent: u32,
) -> OrderTotals {
    let taxable_amount = {
        let after_discount = &subtotal - &discount;
        if after_discount < BigDecimal::zero() {
            BigDecimal::zero()
        } else {
            after_discount
        }
    };
    let tax_amount = &taxable_amount * BigDecimal::from(tax_rate_percent) / &*HUNDRED;
    let total = &taxable_amount + &tax_amount;

    OrderTotals {
        subtotal,
        discount,
        taxable_amount,
        tax_amount,
        total,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvoiceError {
    #[error("failed to render invoice pdf: {0}")]
    Pdf(String),
}

fn rupees(amount: &BigDecimal) -> String {
    // builtin PDF fonts carry no rupee glyph
    format!("Rs. {}", amount.with_scale(2))
}

/// Render the invoice to PDF bytes. A missing or unreadable logo asset is
/// simply omitted; only an actual rendering failure is an error.
pub fn render_invoice_pdf(
    invoice: &InvoiceDocument,
    logo_path: Option<&str>,
) -> Result<Vec<u8>, InvoiceError> {
    let (doc, page, layer) = PdfDocument::new(
        format!("Rupie Times Invoice {}", invoice.invoice_number),
        Mm(210.0),
        Mm(297.0),
        "Invoice",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| InvoiceError::Pdf(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| InvoiceError::Pdf(e.to_string()))?;

    let layer = doc.get_page(page).get_layer(layer);

    let logo_drawn = logo_path
        .map(|path| try_embed_logo(&layer, path))
        .unwrap_or(false);
    if !logo_drawn {
        layer.use_text("RUPIE TIMES", 22.0, Mm(20.0), Mm(272.0), &bold);
    }

    layer.use_text("TAX INVOICE", 14.0, Mm(20.0), Mm(258.0), &bold);
    layer.use_text(
        format!("Invoice no: {}", invoice.invoice_number),
        10.0,
        Mm(20.0),
        Mm(250.0),
        &regular,
    );
    layer.use_text(
        format!("Issued on: {}", invoice.issued_on_ist()),
        10.0,
        Mm(20.0),
        Mm(244.0),
        &regular,
    );
    layer.use_text("Billed to:", 10.0, Mm(20.0), Mm(234.0), &bold);
    layer.use_text(invoice.customer.name.as_str(), 10.0, Mm(20.0), Mm(228.0), &regular);
    layer.use_text(invoice.customer.email.as_str(), 10.0, Mm(20.0), Mm(222.0), &regular);

    let mut y = 208.0;
    layer.use_text("Subscription", 10.0, Mm(20.0), Mm(y), &bold);
    layer.use_text("Duration", 10.0, Mm(105.0), Mm(y), &bold);
    layer.use_text("Price", 10.0, Mm(140.0), Mm(y), &bold);
    layer.use_text("Paid", 10.0, Mm(170.0), Mm(y), &bold);
    y -= 7.0;

    for line in &invoice.lines {
        layer.use_text(line.description.as_str(), 10.0, Mm(20.0), Mm(y), &regular);
        layer.use_text(line.duration.as_str(), 10.0, Mm(105.0), Mm(y), &regular);
        layer.use_text(
            rupees(&line.original_price),
            10.0,
            Mm(140.0),
            Mm(y),
            &regular,
        );
        layer.use_text(rupees(&line.amount_paid), 10.0, Mm(170.0), Mm(y), &regular);
        y -= 6.0;
        if y < 60.0 {
            break; // a checkout cart never comes close to a full page
        }
    }

    y -= 8.0;
    let totals = &invoice.totals;
    render_total_row(&layer, &regular, y, "Subtotal", &totals.subtotal);
    y -= 6.0;
    if !totals.discount.is_zero() {
        let label = match &invoice.promo_code {
            Some(code) => format!("Discount ({})", code),
            None => "Discount".to_string(),
        };
        layer.use_text(label, 10.0, Mm(140.0), Mm(y), &regular);
        layer.use_text(
            format!("- {}", rupees(&totals.discount)),
            10.0,
            Mm(170.0),
            Mm(y),
            &regular,
        );
        y -= 6.0;
    }
    render_total_row(&layer, &regular, y, "GST", &totals.tax_amount);
    y -= 7.0;
    layer.use_text("Total", 11.0, Mm(140.0), Mm(y), &bold);
    layer.use_text(rupees(&totals.total), 11.0, Mm(170.0), Mm(y), &bold);

    layer.use_text(
        "Rupie Times · This is a system generated invoice.",
        8.0,
        Mm(20.0),
        Mm(20.0),
        &regular,
    );

    doc.save_to_bytes().map_err(|e| InvoiceError::Pdf(e.to_string()))
}

fn render_total_row(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    y: f32,
    label: &str,
    amount: &BigDecimal,
) {
    layer.use_text(label, 10.0, Mm(140.0), Mm(y), font);
    layer.use_text(rupees(amount), 10.0, Mm(170.0), Mm(y), font);
}

fn try_embed_logo(layer: &PdfLayerReference, path: &str) -> bool {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let decoder =
        match printpdf::image_crate::codecs::png::PngDecoder::new(std::io::Cursor::new(bytes)) {
            Ok(decoder) => decoder,
            Err(_) => return false,
        };
    let image = match printpdf::Image::try_from(decoder) {
        Ok(image) => image,
        Err(_) => return false,
    };
    image.add_to_layer(
        layer.clone(),
        printpdf::ImageTransform {
            translate_x: Some(Mm(20.0)),
            translate_y: Some(Mm(268.0)),
            ..Default::default()
        },
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_ok;
    use std::str::FromStr;

    fn money(raw: &str) -> BigDecimal {
        BigDecimal::from_str(raw).unwrap()
    }

    fn sample_invoice() -> InvoiceDocument {
        InvoiceDocument {
            invoice_number: "order_Mz1aBcDeFgHiJk".to_string(),
            issued_at: DateTime::parse_from_rfc3339("2024-01-15T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            customer: InvoiceCustomer {
                name: "Test Reader".to_string(),
                email: "reader@example.com".to_string(),
            },
            lines: vec![InvoiceLine {
                description: "Market Pulse Daily".to_string(),
                duration: "1 Month".to_string(),
                original_price: money("100"),
                amount_paid: money("100"),
            }],
            totals: compute_order_totals(money("100"), BigDecimal::zero(), 18),
            promo_code: None,
        }
    }

    #[test]
    fn an_undiscounted_hundred_rupee_order_totals_118() {
        let totals = compute_order_totals(money("100"), BigDecimal::zero(), 18);
        assert_eq!(totals.taxable_amount, money("100"));
        assert_eq!(totals.tax_amount.with_scale(2), money("18.00"));
        assert_eq!(totals.total.with_scale(2), money("118.00"));
    }

    #[test]
    fn the_discount_comes_off_before_tax() {
        let totals = compute_order_totals(money("499.00"), money("99.00"), 18);
        assert_eq!(totals.taxable_amount, money("400.00"));
        assert_eq!(totals.tax_amount.with_scale(2), money("72.00"));
        assert_eq!(totals.total.with_scale(2), money("472.00"));
    }

    #[test]
    fn an_oversized_discount_clamps_the_taxable_amount_to_zero() {
        let totals = compute_order_totals(money("100"), money("150"), 18);
        assert_eq!(totals.taxable_amount, BigDecimal::zero());
        assert_eq!(totals.tax_amount.with_scale(2), money("0.00"));
        assert_eq!(totals.total.with_scale(2), money("0.00"));
    }

    #[test]
    fn a_zero_rate_charges_no_tax() {
        let totals = compute_order_totals(money("100"), BigDecimal::zero(), 0);
        assert_eq!(totals.tax_amount.with_scale(2), money("0.00"));
        assert_eq!(totals.total.with_scale(2), money("100.00"));
    }

    #[test]
    fn the_invoice_renders_to_pdf_bytes() {
        let bytes = assert_ok!(render_invoice_pdf(&sample_invoice(), None));
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn a_missing_logo_asset_is_omitted_not_fatal() {
        let bytes = assert_ok!(render_invoice_pdf(
            &sample_invoice(),
            Some("/definitely/not/a/real/logo.png"),
        ));
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn issue_timestamps_render_in_ist() {
        let invoice = sample_invoice();
        // 2024-01-15T00:00:00Z is 05:30 the same morning in Kolkata
        assert_eq!(invoice.issued_on_ist(), "15 Jan 2024, 05:30 AM IST");
    }
}
