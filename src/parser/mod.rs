pub mod units;
mod xml;

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use encoding_rs::WINDOWS_1251;
use std::error::Error;
use std::fmt;

use crate::models::{IssueSeverity, LineItem, ParsedDocument, ParsingIssue};
use xml::Element;

/// Fatal parse failures. Everything else is recorded as a `ParsingIssue` on
/// the successfully returned document.
#[derive(Debug)]
pub enum ParseFailure {
    /// Bytes outside the windows-1251 repertoire. The codepage maps every
    /// byte, so its unassigned slots surface as C1 control characters after
    /// decoding; those are rejected here.
    InvalidEncoding,
    MalformedXml(String),
    /// Document number or date missing after all fallbacks.
    MissingField(&'static str),
    /// No line item survived extraction.
    NoLineItems,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseFailure::InvalidEncoding => {
                write!(f, "document bytes are not valid windows-1251")
            }
            ParseFailure::MalformedXml(msg) => write!(f, "malformed XML: {}", msg),
            ParseFailure::MissingField(field) => {
                write!(f, "required field missing after all fallbacks: {}", field)
            }
            ParseFailure::NoLineItems => write!(f, "document contains no readable line items"),
        }
    }
}

impl Error for ParseFailure {}

/// Accumulates recoverable problems; the generator tag is attached once
/// detection has run.
#[derive(Default)]
struct IssueLog {
    generator: Option<String>,
    items: Vec<ParsingIssue>,
}

impl IssueLog {
    fn push(
        &mut self,
        severity: IssueSeverity,
        element: &str,
        message: String,
        value: Option<String>,
    ) {
        self.items.push(ParsingIssue {
            severity,
            element: element.to_string(),
            message,
            generator: self.generator.clone(),
            value,
        });
    }

    fn info(&mut self, element: &str, message: impl Into<String>, value: Option<&str>) {
        self.push(IssueSeverity::Info, element, message.into(), value.map(str::to_string));
    }

    fn warning(&mut self, element: &str, message: impl Into<String>, value: Option<&str>) {
        self.push(IssueSeverity::Warning, element, message.into(), value.map(str::to_string));
    }
}

/// Turns raw generator output into a canonical `ParsedDocument`.
///
/// Parsing is a pure synchronous function of its input: no I/O, no shared
/// state, identical output for identical bytes. Recoverable problems are
/// accumulated as issues on the result instead of thrown.
pub struct DocumentParser {
    default_tax_rate: BigDecimal,
}

impl DocumentParser {
    pub fn new(default_tax_rate: BigDecimal) -> Self {
        Self { default_tax_rate }
    }

    pub fn parse(&self, raw: &[u8]) -> Result<ParsedDocument, ParseFailure> {
        let (text, _, _) = WINDOWS_1251.decode(raw);
        // windows-1251 decoding is total; unassigned codepage slots come out
        // as C1 controls, which no supported generator emits.
        if text.chars().any(|c| ('\u{80}'..='\u{9f}').contains(&c)) {
            return Err(ParseFailure::InvalidEncoding);
        }
        let root = xml::parse_tree(&text).map_err(ParseFailure::MalformedXml)?;

        let mut issues = IssueLog::default();
        let declared = root.attr("Program").or_else(|| root.attr("CreatedBy"));
        let generator = declared
            .and_then(known_generator)
            .unwrap_or("Unknown")
            .to_string();
        // Tag the log before the first push so detection's own issues carry
        // the generator they implicate.
        issues.generator = Some(generator.clone());
        match declared {
            Some(raw) if generator == "Unknown" => {
                issues.info("Program", "unrecognized generator", Some(raw))
            }
            None => issues.info("Program", "generator not declared", None),
            _ => {}
        }

        let format_version = root
            .attr("FormatVersion")
            .or_else(|| root.attr("Version"))
            .map(str::to_string);

        let document_number =
            attr_fallback(&root, "Number", "DocNumber", "document number", &mut issues)
                .ok_or(ParseFailure::MissingField("document number"))?;
        let date_raw = attr_fallback(&root, "Date", "DocDate", "document date", &mut issues)
            .ok_or(ParseFailure::MissingField("document date"))?;
        let document_date =
            parse_date(&date_raw).ok_or(ParseFailure::MissingField("document date"))?;

        let mut supplier_tax_id = root
            .attr("SenderTaxId")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let mut supplier_name =
            attr_fallback(&root, "Sender", "Supplier", "supplier name", &mut issues);
        if supplier_tax_id.is_none() {
            if let Some(name) = supplier_name.as_deref() {
                if let Some((tax_id, cleaned)) = extract_embedded_tax_id(name) {
                    issues.info(
                        "Sender",
                        "supplier tax id extracted from free-text name",
                        Some(&tax_id),
                    );
                    supplier_tax_id = Some(tax_id);
                    supplier_name = Some(cleaned);
                }
            }
        }

        let container = root.child("Items").or_else(|| {
            let legacy = root.child("Table");
            if legacy.is_some() {
                issues.warning("Items", "items container found under legacy tag Table", None);
            }
            legacy
        });
        let container = container.ok_or(ParseFailure::NoLineItems)?;

        let mut items: Vec<LineItem> = Vec::new();
        for (idx, child) in container
            .children
            .iter()
            .filter(|c| c.name.starts_with("Item"))
            .enumerate()
        {
            let label = format!("{}[{}]", child.name, idx + 1);
            if let Some(item) = self.parse_item(child, &label, &mut issues) {
                items.push(item);
            }
        }
        if items.is_empty() {
            return Err(ParseFailure::NoLineItems);
        }

        // Totals are always sums over accepted items; grand totals present in
        // the source are untrusted input.
        let mut total_amount = BigDecimal::zero();
        let mut total_tax = BigDecimal::zero();
        let mut total_with_tax = BigDecimal::zero();
        for item in &items {
            total_amount += &item.amount_before_tax;
            total_tax += &item.tax_amount;
            total_with_tax += &item.amount_with_tax;
        }

        Ok(ParsedDocument {
            document_number,
            document_date,
            supplier_name,
            supplier_tax_id,
            total_amount,
            total_tax,
            total_with_tax,
            generator,
            format_version,
            items,
            issues: issues.items,
        })
    }

    /// Tries the primary goods shape, then the service fallback. Rows failing
    /// both are skipped with a warning; never fatal.
    fn parse_item(&self, el: &Element, label: &str, issues: &mut IssueLog) -> Option<LineItem> {
        let product_name = el
            .attr("Name")
            .or_else(|| el.attr("Description"))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let Some(product_name) = product_name else {
            issues.warning(label, "item has neither Name nor Description, skipped", None);
            return None;
        };

        let quantity = positive_attr(el, "Quantity", label, issues);
        let price = positive_attr(el, "Price", label, issues);
        let net = positive_attr(el, "Amount", label, issues);
        let gross_attr = decimal_attr(el, "Total", label, issues);

        let (quantity, unit, unit_price, amount_before_tax) = if let Some(qty) = quantity {
            // Primary shape: a goods row. One of price/amount may be derived
            // from the other.
            let (unit_price, amount_before_tax) = match (price, net) {
                (Some(p), Some(n)) => (p, n),
                (Some(p), None) => {
                    let n = (&p * &qty).round(2);
                    (p, n)
                }
                (None, Some(n)) => {
                    let p = (&n / &qty).round(4);
                    (p, n)
                }
                (None, None) => {
                    issues.warning(
                        label,
                        "item has quantity but no price or amount, skipped",
                        Some(&product_name),
                    );
                    return None;
                }
            };
            let unit = resolve_unit(el, label, issues);
            (qty, unit, unit_price, amount_before_tax)
        } else if let Some(base) = net {
            // Service fallback: no usable quantity/price, nonzero net amount.
            issues.info(
                label,
                "no quantity or price, row treated as a service",
                Some(&product_name),
            );
            (
                BigDecimal::from(1),
                units::SERVICE_UNIT.to_string(),
                base.clone(),
                base,
            )
        } else {
            issues.warning(
                label,
                "item matches neither goods nor service shape, skipped",
                Some(&product_name),
            );
            return None;
        };

        let tax_rate = self.resolve_tax_rate(el, label, issues);
        let tax_amount = match decimal_attr(el, "TaxAmount", label, issues) {
            Some(t) => t,
            None => (&amount_before_tax * &tax_rate / BigDecimal::from(100)).round(2),
        };

        let computed_gross = &amount_before_tax + &tax_amount;
        let amount_with_tax = match gross_attr {
            Some(gross) => {
                let drift = (&gross - &computed_gross).abs();
                if drift > crate::models::distribution::amount_tolerance() {
                    issues.warning(
                        label,
                        format!(
                            "amount with tax {} does not reconcile with net {} + tax {}",
                            gross, amount_before_tax, tax_amount
                        ),
                        Some(&gross.to_string()),
                    );
                }
                gross
            }
            None => computed_gross,
        };

        Some(LineItem {
            product_name,
            quantity,
            unit,
            unit_price,
            amount_before_tax,
            tax_rate,
            tax_amount,
            amount_with_tax,
        })
    }

    /// Three-step rate chain: explicit numeric field, alternate field with a
    /// trailing percent marker, fixed default.
    fn resolve_tax_rate(&self, el: &Element, label: &str, issues: &mut IssueLog) -> BigDecimal {
        if let Some(rate) = decimal_attr(el, "TaxRate", label, issues) {
            return rate;
        }
        if let Some(raw) = el.attr("Vat") {
            let stripped = raw.trim().trim_end_matches('%').trim();
            if let Some(rate) = parse_decimal(stripped) {
                issues.info(label, "tax rate read from alternate field Vat", Some(raw));
                return rate;
            }
        }
        issues.warning(
            label,
            "tax rate missing, default rate applied",
            Some(&self.default_tax_rate.to_string()),
        );
        self.default_tax_rate.clone()
    }
}

fn resolve_unit(el: &Element, label: &str, issues: &mut IssueLog) -> String {
    match el.attr("UnitCode").map(str::trim).filter(|v| !v.is_empty()) {
        Some(code) => match units::resolve(code) {
            Some(unit) => unit.to_string(),
            None => {
                issues.info(label, "unresolved unit code used as-is", Some(code));
                code.to_string()
            }
        },
        None => {
            issues.info(label, "unit code missing", None);
            "-".to_string()
        }
    }
}

/// Primary attribute, then the older-schema attribute with a warning naming
/// the field that needed the fallback.
fn attr_fallback(
    el: &Element,
    primary: &str,
    secondary: &str,
    field: &str,
    issues: &mut IssueLog,
) -> Option<String> {
    if let Some(v) = el.attr(primary).map(str::trim).filter(|v| !v.is_empty()) {
        return Some(v.to_string());
    }
    if let Some(v) = el.attr(secondary).map(str::trim).filter(|v| !v.is_empty()) {
        issues.warning(
            primary,
            format!("{} read from legacy attribute {}", field, secondary),
            Some(v),
        );
        return Some(v.to_string());
    }
    None
}

fn known_generator(raw: &str) -> Option<&'static str> {
    let lower = raw.to_lowercase();
    if raw.contains("1C") || raw.contains("1С") {
        Some("1C")
    } else if lower.contains("sbis") || raw.contains("СБИС") {
        Some("SBIS")
    } else if lower.contains("diadoc") || lower.contains("kontur") || raw.contains("Контур") {
        Some("Kontur.Diadoc")
    } else {
        None
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%d.%m.%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Legacy generators emit comma decimal separators and NBSP/space group
/// separators.
fn parse_decimal(raw: &str) -> Option<BigDecimal> {
    let normalized: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if normalized.is_empty() {
        return None;
    }
    normalized.parse().ok()
}

/// Decimal attribute for the item-shape decision: zero counts as absent,
/// negative values are flagged and dropped. Quantities, prices and amounts
/// are never negative in the supported dialects.
fn positive_attr(
    el: &Element,
    name: &str,
    label: &str,
    issues: &mut IssueLog,
) -> Option<BigDecimal> {
    let value = decimal_attr(el, name, label, issues)?;
    if value.is_zero() {
        return None;
    }
    if value < BigDecimal::zero() {
        issues.warning(
            label,
            format!("attribute {} is negative, ignored", name),
            Some(&value.to_string()),
        );
        return None;
    }
    Some(value)
}

fn decimal_attr(
    el: &Element,
    name: &str,
    label: &str,
    issues: &mut IssueLog,
) -> Option<BigDecimal> {
    let raw = el.attr(name)?;
    if raw.trim().is_empty() {
        return None;
    }
    match parse_decimal(raw) {
        Some(v) => Some(v),
        None => {
            issues.warning(label, format!("attribute {} is not a number", name), Some(raw));
            None
        }
    }
}

/// Finds a `TaxId <digits>` marker embedded in a free-text supplier name;
/// returns the tax id and the name with the marker stripped.
fn extract_embedded_tax_id(name: &str) -> Option<(String, String)> {
    let bytes = name.as_bytes();
    let marker = b"taxid";
    let mut pos = None;
    for i in 0..bytes.len().saturating_sub(marker.len() - 1) {
        if bytes[i..i + marker.len()].eq_ignore_ascii_case(marker) {
            pos = Some(i);
            break;
        }
    }
    let start = pos?;

    let mut cursor = start + marker.len();
    // Allow a short separator run between the marker and the digits.
    let mut skipped = 0;
    while cursor < bytes.len()
        && skipped < 3
        && matches!(bytes[cursor], b' ' | b':' | b'-' | b'#')
    {
        cursor += 1;
        skipped += 1;
    }
    let digits_start = cursor;
    while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
        cursor += 1;
    }
    let digits = &name[digits_start..cursor];
    if digits.len() != 10 && digits.len() != 12 {
        return None;
    }

    let cleaned = format!("{}{}", &name[..start], &name[cursor..]);
    let cleaned = cleaned.trim_matches(|c: char| c.is_whitespace() || c == ',' || c == ';');
    Some((digits.to_string(), cleaned.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IssueSeverity;

    fn parser() -> DocumentParser {
        DocumentParser::new(BigDecimal::from(20))
    }

    fn encode(xml: &str) -> Vec<u8> {
        WINDOWS_1251.encode(xml).0.into_owned()
    }

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    const GOODS_DOC: &str = r#"<TransferDocument Program="1C:Enterprise 8.3" FormatVersion="5.01"
        Number="TN-381" Date="14.03.2025" Sender="Steel Trade LLC" SenderTaxId="7701234567">
        <Items>
            <Item Name="Rebar A500C 12mm" Quantity="2.5" UnitCode="168" Price="48000"
                  Amount="120000" TaxRate="20" TaxAmount="24000" Total="144000"/>
            <Item Name="Binding wire" Quantity="50" UnitCode="166" Price="90"
                  Amount="4500" TaxRate="20" TaxAmount="900" Total="5400"/>
        </Items>
    </TransferDocument>"#;

    #[test]
    fn parses_a_goods_document() {
        let doc = parser().parse(&encode(GOODS_DOC)).unwrap();
        assert_eq!(doc.document_number, "TN-381");
        assert_eq!(doc.document_date, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert_eq!(doc.supplier_name.as_deref(), Some("Steel Trade LLC"));
        assert_eq!(doc.supplier_tax_id.as_deref(), Some("7701234567"));
        assert_eq!(doc.generator, "1C");
        assert_eq!(doc.format_version.as_deref(), Some("5.01"));
        assert_eq!(doc.items.len(), 2);
        assert_eq!(doc.items[0].unit, "t");
        assert_eq!(doc.items[1].unit, "kg");
        assert!(doc.issues.is_empty());
    }

    #[test]
    fn totals_are_sums_over_items_not_source_totals() {
        let doc = parser().parse(&encode(GOODS_DOC)).unwrap();
        assert_eq!(doc.total_amount, dec("124500"));
        assert_eq!(doc.total_tax, dec("24900"));
        assert_eq!(doc.total_with_tax, dec("149400"));

        let mut amount = BigDecimal::zero();
        let mut with_tax = BigDecimal::zero();
        for item in &doc.items {
            amount += &item.amount_before_tax;
            with_tax += &item.amount_with_tax;
        }
        assert_eq!(doc.total_amount, amount);
        assert_eq!(doc.total_with_tax, with_tax);
    }

    #[test]
    fn reparse_is_idempotent() {
        let bytes = encode(GOODS_DOC);
        let first = parser().parse(&bytes).unwrap();
        let second = parser().parse(&bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn legacy_attributes_parse_with_warnings() {
        let xml = r#"<Document DocNumber="77" DocDate="2024-11-02" Supplier="Old Gen Co">
            <Table>
                <ItemRow Name="Cement" Quantity="10" UnitCode="796" Price="550"
                         Amount="5500" TaxRate="20"/>
            </Table>
        </Document>"#;
        let doc = parser().parse(&encode(xml)).unwrap();
        assert_eq!(doc.document_number, "77");
        assert_eq!(doc.document_date, NaiveDate::from_ymd_opt(2024, 11, 2).unwrap());
        assert_eq!(doc.supplier_name.as_deref(), Some("Old Gen Co"));
        assert_eq!(doc.items.len(), 1);

        let fallbacks: Vec<_> = doc
            .issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .collect();
        // number, date, supplier name, items container
        assert_eq!(fallbacks.len(), 4);
    }

    #[test]
    fn zero_quantity_row_becomes_a_service() {
        let xml = r#"<TransferDocument Program="1C" Number="5" Date="01.02.2025">
            <Items>
                <Item Name="Crane rental, March" Quantity="0" Price="0"
                      Amount="5000" TaxRate="20"/>
            </Items>
        </TransferDocument>"#;
        let doc = parser().parse(&encode(xml)).unwrap();
        assert_eq!(doc.items.len(), 1);
        let item = &doc.items[0];
        assert_eq!(item.quantity, BigDecimal::from(1));
        assert_eq!(item.unit, units::SERVICE_UNIT);
        assert_eq!(item.unit_price, dec("5000"));
        assert_eq!(item.amount_before_tax, dec("5000"));
        assert_eq!(item.amount_with_tax, dec("6000"));

        let infos: Vec<_> = doc
            .issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Info)
            .collect();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].element, "Item[1]");
        assert_eq!(infos[0].value.as_deref(), Some("Crane rental, March"));
    }

    #[test]
    fn unreadable_rows_are_skipped_not_fatal() {
        let xml = r#"<TransferDocument Program="1C" Number="9" Date="05.05.2025">
            <Items>
                <Item Name="Good row" Quantity="1" UnitCode="796" Price="100"
                      Amount="100" TaxRate="20"/>
                <Item Quantity="3" Price="10"/>
                <Item Name="No money row" Quantity="3"/>
            </Items>
        </TransferDocument>"#;
        let doc = parser().parse(&encode(xml)).unwrap();
        assert_eq!(doc.items.len(), 1);
        let warnings = doc
            .issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .count();
        assert_eq!(warnings, 2);
    }

    #[test]
    fn negative_quantity_with_net_amount_falls_back_to_service() {
        let xml = r#"<TransferDocument Program="1C" Number="11" Date="01.02.2025">
            <Items>
                <Item Name="Returned pallets" Quantity="-5" Price="0"
                      Amount="500" TaxRate="20"/>
            </Items>
        </TransferDocument>"#;
        let doc = parser().parse(&encode(xml)).unwrap();
        assert_eq!(doc.items.len(), 1);
        let item = &doc.items[0];
        assert_eq!(item.quantity, BigDecimal::from(1));
        assert_eq!(item.unit, units::SERVICE_UNIT);
        assert!(item.quantity >= BigDecimal::zero());

        assert!(doc.issues.iter().any(|i| {
            i.severity == IssueSeverity::Warning && i.message.contains("Quantity is negative")
        }));
    }

    #[test]
    fn negative_money_row_is_skipped_with_warnings() {
        let xml = r#"<TransferDocument Program="1C" Number="12" Date="01.02.2025">
            <Items>
                <Item Name="Good row" Quantity="1" UnitCode="796" Price="100"
                      Amount="100" TaxRate="20"/>
                <Item Name="Credit note row" Quantity="-5" Amount="-500" TaxRate="20"/>
            </Items>
        </TransferDocument>"#;
        let doc = parser().parse(&encode(xml)).unwrap();
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].product_name, "Good row");
        assert!(doc.items.iter().all(|i| i.quantity >= BigDecimal::zero()));

        assert!(doc.issues.iter().any(|i| {
            i.severity == IssueSeverity::Warning && i.message.contains("Amount is negative")
        }));
        assert!(doc.issues.iter().any(|i| {
            i.severity == IssueSeverity::Warning && i.message.contains("skipped")
        }));
    }

    #[test]
    fn document_without_items_is_rejected() {
        let xml = r#"<TransferDocument Program="1C" Number="9" Date="05.05.2025">
            <Items><Item Quantity="3"/></Items>
        </TransferDocument>"#;
        assert!(matches!(
            parser().parse(&encode(xml)),
            Err(ParseFailure::NoLineItems)
        ));

        let no_container = r#"<TransferDocument Program="1C" Number="9" Date="05.05.2025"/>"#;
        assert!(matches!(
            parser().parse(&encode(no_container)),
            Err(ParseFailure::NoLineItems)
        ));
    }

    #[test]
    fn missing_identity_fields_are_fatal() {
        let no_number = r#"<TransferDocument Date="05.05.2025">
            <Items><Item Name="x" Quantity="1" Price="1" Amount="1" TaxRate="0"/></Items>
        </TransferDocument>"#;
        assert!(matches!(
            parser().parse(&encode(no_number)),
            Err(ParseFailure::MissingField("document number"))
        ));

        let bad_date = r#"<TransferDocument Number="1" Date="tomorrow">
            <Items><Item Name="x" Quantity="1" Price="1" Amount="1" TaxRate="0"/></Items>
        </TransferDocument>"#;
        assert!(matches!(
            parser().parse(&encode(bad_date)),
            Err(ParseFailure::MissingField("document date"))
        ));
    }

    #[test]
    fn malformed_input_is_fatal() {
        assert!(matches!(
            parser().parse(&encode("<Doc><Items></Doc>")),
            Err(ParseFailure::MalformedXml(_))
        ));
        // 0x98 is unmapped in windows-1251.
        assert!(matches!(
            parser().parse(&[b'<', 0x98, b'>']),
            Err(ParseFailure::InvalidEncoding)
        ));
    }

    #[test]
    fn tax_rate_fallback_chain() {
        let xml = r#"<TransferDocument Program="1C" Number="2" Date="01.01.2025">
            <Items>
                <Item Name="alt rate" Quantity="1" UnitCode="796" Price="100" Amount="100" Vat="10%"/>
                <Item Name="no rate" Quantity="1" UnitCode="796" Price="100" Amount="100"/>
            </Items>
        </TransferDocument>"#;
        let doc = parser().parse(&encode(xml)).unwrap();
        assert_eq!(doc.items[0].tax_rate, dec("10"));
        assert_eq!(doc.items[0].tax_amount, dec("10.00"));
        assert_eq!(doc.items[1].tax_rate, dec("20"));

        assert!(doc.issues.iter().any(|i| {
            i.severity == IssueSeverity::Info && i.message.contains("alternate field Vat")
        }));
        assert!(doc.issues.iter().any(|i| {
            i.severity == IssueSeverity::Warning && i.message.contains("default rate")
        }));
    }

    #[test]
    fn non_reconciling_gross_is_flagged_but_kept() {
        let xml = r#"<TransferDocument Program="1C" Number="3" Date="01.01.2025">
            <Items>
                <Item Name="drift" Quantity="1" UnitCode="796" Price="100"
                      Amount="100" TaxRate="20" TaxAmount="20" Total="125"/>
            </Items>
        </TransferDocument>"#;
        let doc = parser().parse(&encode(xml)).unwrap();
        assert_eq!(doc.items[0].amount_with_tax, dec("125"));
        assert!(doc.issues.iter().any(|i| {
            i.severity == IssueSeverity::Warning && i.message.contains("does not reconcile")
        }));
    }

    #[test]
    fn unresolved_unit_code_passes_through() {
        let xml = r#"<TransferDocument Program="1C" Number="4" Date="01.01.2025">
            <Items>
                <Item Name="odd unit" Quantity="1" UnitCode="999" Price="10"
                      Amount="10" TaxRate="0"/>
            </Items>
        </TransferDocument>"#;
        let doc = parser().parse(&encode(xml)).unwrap();
        assert_eq!(doc.items[0].unit, "999");
        assert!(doc
            .issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Info && i.message.contains("unresolved unit")));
    }

    #[test]
    fn embedded_tax_id_is_stripped_from_supplier_name() {
        let xml = r#"<TransferDocument Program="1C" Number="6" Date="01.01.2025"
            Sender="Acme Ltd, TaxId 1234567890">
            <Items><Item Name="x" Quantity="1" UnitCode="796" Price="1" Amount="1" TaxRate="0"/></Items>
        </TransferDocument>"#;
        let doc = parser().parse(&encode(xml)).unwrap();
        assert_eq!(doc.supplier_tax_id.as_deref(), Some("1234567890"));
        assert_eq!(doc.supplier_name.as_deref(), Some("Acme Ltd"));
    }

    #[test]
    fn embedded_tax_id_requires_plausible_length() {
        assert!(extract_embedded_tax_id("Acme, TaxId 123").is_none());
        let (id, name) = extract_embedded_tax_id("TaxId: 770123456789 Acme").unwrap();
        assert_eq!(id, "770123456789");
        assert_eq!(name, "Acme");
    }

    #[test]
    fn cyrillic_content_survives_the_legacy_encoding() {
        let xml = r#"<TransferDocument Program="СБИС 23.1" Number="8" Date="01.01.2025"
            Sender="ООО Стройснаб">
            <Items>
                <Item Name="Кирпич керамический" Quantity="1000" UnitCode="796"
                      Price="32.50" Amount="32500" TaxRate="20"/>
            </Items>
        </TransferDocument>"#;
        let doc = parser().parse(&encode(xml)).unwrap();
        assert_eq!(doc.generator, "SBIS");
        assert_eq!(doc.supplier_name.as_deref(), Some("ООО Стройснаб"));
        assert_eq!(doc.items[0].product_name, "Кирпич керамический");
    }

    #[test]
    fn unknown_generator_is_tagged_not_fatal() {
        let xml = r#"<TransferDocument Program="HomeGrown ERP v2" Number="10" Date="01.01.2025">
            <Items><Item Name="x" Quantity="1" UnitCode="796" Price="1" Amount="1" TaxRate="0"/></Items>
        </TransferDocument>"#;
        let doc = parser().parse(&encode(xml)).unwrap();
        assert_eq!(doc.generator, "Unknown");
        let issue = doc
            .issues
            .iter()
            .find(|i| i.element == "Program" && i.severity == IssueSeverity::Info)
            .unwrap();
        // Detection's own issue carries the generator tag it resolved to.
        assert_eq!(issue.generator.as_deref(), Some("Unknown"));
        assert_eq!(issue.value.as_deref(), Some("HomeGrown ERP v2"));
    }

    #[test]
    fn comma_decimals_and_group_separators_are_normalized() {
        assert_eq!(parse_decimal("1 234,56"), Some(dec("1234.56")));
        assert_eq!(parse_decimal("\u{a0}2,5"), Some(dec("2.5")));
        assert_eq!(parse_decimal("abc"), None);
    }
}
