//! GST line and document totals.
//!
//! Every amount is rounded half away from zero to two decimals as soon as it
//! is computed; document totals are sums of the rounded line amounts.

use crate::entities::{invoice_item, order_item, quotation_item};
use crate::errors::ServiceError;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// GST slabs accepted on a line
pub const GST_RATES: [Decimal; 7] = [
    dec!(0),
    dec!(0.25),
    dec!(3),
    dec!(5),
    dec!(12),
    dec!(18),
    dec!(28),
];

const HUNDRED: Decimal = dec!(100);

/// Largest amount a `decimal(14,2)` money column holds
pub const MAX_AMOUNT: Decimal = dec!(999_999_999_999.99);

/// Result of a checked operation, refused when it overflowed or exceeds
/// [`MAX_AMOUNT`] in either direction.
pub fn bounded_amount(value: Option<Decimal>, field: impl Into<String>) -> Result<Decimal, ServiceError> {
    match value {
        Some(amount) if amount.abs() <= MAX_AMOUNT => Ok(amount),
        _ => Err(ServiceError::invalid_field(
            field,
            format!("amount exceeds the maximum of {MAX_AMOUNT}"),
        )),
    }
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn round_rupee(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LineItemInput {
    pub name: String,
    pub description: Option<String>,
    pub hsn_code: Option<String>,
    #[schema(value_type = f64)]
    pub quantity: Decimal,
    pub unit: Option<String>,
    #[schema(value_type = f64)]
    pub unit_price: Decimal,
    #[serde(default)]
    #[schema(value_type = f64)]
    pub discount_percent: Decimal,
    #[schema(value_type = f64)]
    pub gst_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub line_no: i32,
    pub input: LineItemInput,
    pub gross_amount: Decimal,
    pub discount_amount: Decimal,
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub taxable_total: Decimal,
    pub cgst_total: Decimal,
    pub sgst_total: Decimal,
    pub igst_total: Decimal,
    pub tax_total: Decimal,
    pub round_off: Decimal,
    pub grand_total: Decimal,
}

#[derive(Debug, Clone)]
pub struct PricedDocument {
    pub lines: Vec<PricedLine>,
    pub totals: DocumentTotals,
}

/// Checks a single line; errors name the field as `items[i].field`.
pub fn validate_line(index: usize, line: &LineItemInput) -> Result<(), ServiceError> {
    let field = |name: &str| format!("items[{index}].{name}");

    if line.name.trim().is_empty() {
        return Err(ServiceError::invalid_field(field("name"), "item name is required"));
    }
    if line.quantity <= Decimal::ZERO {
        return Err(ServiceError::invalid_field(
            field("quantity"),
            "quantity must be greater than zero",
        ));
    }
    if line.unit_price < Decimal::ZERO {
        return Err(ServiceError::invalid_field(
            field("unit_price"),
            "unit price cannot be negative",
        ));
    }
    if line.discount_percent < Decimal::ZERO || line.discount_percent > HUNDRED {
        return Err(ServiceError::invalid_field(
            field("discount_percent"),
            "discount must be between 0 and 100",
        ));
    }
    if !GST_RATES.contains(&line.gst_rate) {
        return Err(ServiceError::invalid_field(
            field("gst_rate"),
            format!("unsupported GST rate {}", line.gst_rate),
        ));
    }
    Ok(())
}

pub fn price_line(index: usize, line: &LineItemInput) -> Result<PricedLine, ServiceError> {
    validate_line(index, line)?;

    let gross = round_money(bounded_amount(
        line.quantity.checked_mul(line.unit_price),
        format!("items[{index}].quantity"),
    )?);
    let discount = round_money(gross * line.discount_percent / HUNDRED);
    let taxable = gross - discount;
    let tax = round_money(taxable * line.gst_rate / HUNDRED);

    Ok(PricedLine {
        line_no: index as i32 + 1,
        input: LineItemInput {
            name: line.name.trim().to_string(),
            ..line.clone()
        },
        gross_amount: gross,
        discount_amount: discount,
        taxable_amount: taxable,
        tax_amount: tax,
        line_total: taxable + tax,
    })
}

/// Prices every line and derives the document totals. Tax is split into
/// CGST/SGST when the place of supply is the branch's own state.
pub fn price_document(
    items: &[LineItemInput],
    place_of_supply: &str,
    branch_state: &str,
) -> Result<PricedDocument, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::invalid_field("items", "at least one item is required"));
    }

    let lines = items
        .iter()
        .enumerate()
        .map(|(i, line)| price_line(i, line))
        .collect::<Result<Vec<_>, _>>()?;

    let mut totals = DocumentTotals::default();
    for line in &lines {
        totals.subtotal += line.gross_amount;
        totals.discount_total += line.discount_amount;
        totals.taxable_total += line.taxable_amount;
        totals.tax_total += line.tax_amount;
    }

    if place_of_supply.trim() == branch_state.trim() {
        totals.cgst_total = round_money(totals.tax_total / dec!(2));
        totals.sgst_total = totals.tax_total - totals.cgst_total;
    } else {
        totals.igst_total = totals.tax_total;
    }

    let exact = totals.taxable_total + totals.tax_total;
    totals.grand_total = bounded_amount(Some(round_rupee(exact)), "items")?;
    totals.round_off = totals.grand_total - exact;

    Ok(PricedDocument { lines, totals })
}

/// Explicit value, else the counterparty's state, else the branch's own state.
pub fn resolve_place_of_supply(explicit: Option<&str>, party_state: Option<&str>, branch_state: &str) -> String {
    fn given(v: Option<&str>) -> Option<&str> {
        v.map(str::trim).filter(|s| !s.is_empty())
    }
    given(explicit)
        .or_else(|| given(party_state))
        .unwrap_or(branch_state)
        .to_string()
}

/// Copies [`DocumentTotals`] onto a document active model.
macro_rules! apply_totals {
    ($model:expr, $totals:expr) => {{
        let totals = &$totals;
        $model.subtotal = sea_orm::Set(totals.subtotal);
        $model.discount_total = sea_orm::Set(totals.discount_total);
        $model.taxable_total = sea_orm::Set(totals.taxable_total);
        $model.cgst_total = sea_orm::Set(totals.cgst_total);
        $model.sgst_total = sea_orm::Set(totals.sgst_total);
        $model.igst_total = sea_orm::Set(totals.igst_total);
        $model.tax_total = sea_orm::Set(totals.tax_total);
        $model.round_off = sea_orm::Set(totals.round_off);
        $model.grand_total = sea_orm::Set(totals.grand_total);
    }};
}
pub(crate) use apply_totals;

/// Conversions between stored line rows and pricing inputs for the
/// document item tables that share the same shape.
macro_rules! line_item_conversions {
    ($module:ident, $parent:ident) => {
        impl From<&$module::Model> for LineItemInput {
            fn from(item: &$module::Model) -> Self {
                LineItemInput {
                    name: item.name.clone(),
                    description: item.description.clone(),
                    hsn_code: item.hsn_code.clone(),
                    quantity: item.quantity,
                    unit: item.unit.clone(),
                    unit_price: item.unit_price,
                    discount_percent: item.discount_percent,
                    gst_rate: item.gst_rate,
                }
            }
        }

        impl PricedLine {
            pub fn $module(&self, parent_id: Uuid) -> $module::ActiveModel {
                $module::ActiveModel {
                    id: sea_orm::Set(Uuid::new_v4()),
                    $parent: sea_orm::Set(parent_id),
                    line_no: sea_orm::Set(self.line_no),
                    name: sea_orm::Set(self.input.name.clone()),
                    description: sea_orm::Set(self.input.description.clone()),
                    hsn_code: sea_orm::Set(self.input.hsn_code.clone()),
                    quantity: sea_orm::Set(self.input.quantity),
                    unit: sea_orm::Set(self.input.unit.clone()),
                    unit_price: sea_orm::Set(self.input.unit_price),
                    discount_percent: sea_orm::Set(self.input.discount_percent),
                    gst_rate: sea_orm::Set(self.input.gst_rate),
                    gross_amount: sea_orm::Set(self.gross_amount),
                    discount_amount: sea_orm::Set(self.discount_amount),
                    taxable_amount: sea_orm::Set(self.taxable_amount),
                    tax_amount: sea_orm::Set(self.tax_amount),
                    line_total: sea_orm::Set(self.line_total),
                }
            }
        }
    };
}

line_item_conversions!(quotation_item, quotation_id);
line_item_conversions!(order_item, order_id);
line_item_conversions!(invoice_item, invoice_id);

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn place_of_supply_fallbacks() {
        assert_eq!(resolve_place_of_supply(Some("29"), Some("27"), "24"), "29");
        assert_eq!(resolve_place_of_supply(Some(" "), Some("27"), "24"), "27");
        assert_eq!(resolve_place_of_supply(None, None, "24"), "24");
    }

    fn line(name: &str, qty: Decimal, price: Decimal, disc: Decimal, rate: Decimal) -> LineItemInput {
        LineItemInput {
            name: name.into(),
            description: None,
            hsn_code: None,
            quantity: qty,
            unit: Some("nos".into()),
            unit_price: price,
            discount_percent: disc,
            gst_rate: rate,
        }
    }

    #[test]
    fn prices_a_discounted_line() {
        let priced = price_line(0, &line("Pump", dec!(3), dec!(1250.50), dec!(10), dec!(18))).unwrap();
        assert_eq!(priced.line_no, 1);
        assert_eq!(priced.gross_amount, dec!(3751.50));
        assert_eq!(priced.discount_amount, dec!(375.15));
        assert_eq!(priced.taxable_amount, dec!(3376.35));
        assert_eq!(priced.tax_amount, dec!(607.74));
        assert_eq!(priced.line_total, dec!(3984.09));
    }

    #[test]
    fn intra_state_splits_cgst_and_sgst() {
        let doc = price_document(
            &[
                line("Valve", dec!(1), dec!(100.05), dec!(0), dec!(5)),
                line("Cable", dec!(2), dec!(10), dec!(0), dec!(18)),
            ],
            "27",
            "27",
        )
        .unwrap();

        // 5.00 (5.0025 rounded) + 3.60
        assert_eq!(doc.totals.tax_total, dec!(8.60));
        assert_eq!(doc.totals.cgst_total, dec!(4.30));
        assert_eq!(doc.totals.sgst_total, dec!(4.30));
        assert_eq!(doc.totals.igst_total, Decimal::ZERO);
        assert_eq!(doc.totals.taxable_total, dec!(120.05));
        assert_eq!(doc.totals.grand_total, dec!(129));
        assert_eq!(doc.totals.round_off, dec!(0.35));
    }

    #[test]
    fn odd_paise_goes_to_sgst() {
        let doc = price_document(&[line("Bolt", dec!(1), dec!(0.10), dec!(0), dec!(5))], "07", "07").unwrap();
        assert_eq!(doc.totals.tax_total, dec!(0.01));
        assert_eq!(doc.totals.cgst_total, dec!(0.01));
        assert_eq!(doc.totals.sgst_total, dec!(0.00));
    }

    #[test]
    fn inter_state_uses_igst() {
        let doc = price_document(&[line("Motor", dec!(1), dec!(1000), dec!(0), dec!(12))], "29", "27").unwrap();
        assert_eq!(doc.totals.igst_total, dec!(120.00));
        assert_eq!(doc.totals.cgst_total, Decimal::ZERO);
        assert_eq!(doc.totals.grand_total, dec!(1120));
        assert_eq!(doc.totals.round_off, Decimal::ZERO);
    }

    #[test]
    fn missing_name_names_the_line() {
        let err = price_document(
            &[
                line("Valve", dec!(1), dec!(10), dec!(0), dec!(5)),
                line("Pipe", dec!(1), dec!(10), dec!(0), dec!(5)),
                line("  ", dec!(1), dec!(10), dec!(0), dec!(5)),
            ],
            "27",
            "27",
        )
        .unwrap_err();
        assert_matches!(err, ServiceError::InvalidField { field, .. } if field == "items[2].name");
    }

    #[test]
    fn rejects_bad_rates_quantities_and_empty_documents() {
        assert_matches!(
            price_line(0, &line("X", dec!(1), dec!(1), dec!(0), dec!(7))),
            Err(ServiceError::InvalidField { field, .. }) if field == "items[0].gst_rate"
        );
        assert_matches!(
            price_line(1, &line("X", dec!(0), dec!(1), dec!(0), dec!(5))),
            Err(ServiceError::InvalidField { field, .. }) if field == "items[1].quantity"
        );
        assert_matches!(
            price_line(0, &line("X", dec!(1), dec!(1), dec!(101), dec!(5))),
            Err(ServiceError::InvalidField { field, .. }) if field == "items[0].discount_percent"
        );
        assert_matches!(
            price_document(&[], "27", "27"),
            Err(ServiceError::InvalidField { field, .. }) if field == "items"
        );
    }

    #[test]
    fn oversized_lines_and_documents_are_refused() {
        let huge = dec!(1000000000000000);
        assert_matches!(
            price_document(&[line("Coil", huge, huge, dec!(0), dec!(18))], "27", "27"),
            Err(ServiceError::InvalidField { field, .. }) if field == "items[0].quantity"
        );
        assert_matches!(
            price_line(0, &line("Coil", Decimal::MAX, dec!(2), dec!(0), dec!(18))),
            Err(ServiceError::InvalidField { field, .. }) if field == "items[0].quantity"
        );

        // each line fits, the sum does not
        let big = line("Plant", dec!(1), dec!(600000000000), dec!(0), dec!(0));
        assert_matches!(
            price_document(&[big.clone(), big], "27", "27"),
            Err(ServiceError::InvalidField { field, .. }) if field == "items"
        );

        let at_limit = price_line(0, &line("Plant", dec!(1), MAX_AMOUNT, dec!(0), dec!(0))).unwrap();
        assert_eq!(at_limit.gross_amount, MAX_AMOUNT);
    }

    fn arb_line() -> impl Strategy<Value = LineItemInput> {
        (1u32..10_000, 0u32..10_000_000, 0u32..=100, 0usize..GST_RATES.len()).prop_map(
            |(qty_milli, price_paise, disc, rate)| {
                line(
                    "Item",
                    Decimal::new(qty_milli as i64, 3),
                    Decimal::new(price_paise as i64, 2),
                    Decimal::from(disc),
                    GST_RATES[rate],
                )
            },
        )
    }

    proptest! {
        #[test]
        fn totals_are_internally_consistent(
            items in prop::collection::vec(arb_line(), 1..8),
            same_state in any::<bool>(),
        ) {
            let pos = if same_state { "27" } else { "24" };
            let doc = price_document(&items, pos, "27").unwrap();
            let t = &doc.totals;

            prop_assert_eq!(t.subtotal - t.discount_total, t.taxable_total);
            prop_assert_eq!(t.cgst_total + t.sgst_total + t.igst_total, t.tax_total);
            prop_assert_eq!(t.grand_total, t.taxable_total + t.tax_total + t.round_off);
            prop_assert!(t.round_off.abs() <= dec!(0.50));
            prop_assert_eq!(t.grand_total.fract(), Decimal::ZERO);
            for l in &doc.lines {
                prop_assert_eq!(l.line_total, l.taxable_amount + l.tax_amount);
                prop_assert!(l.taxable_amount >= Decimal::ZERO);
            }
        }
    }
}
