//! Invoice rendering for `SendInvoiceEmail` jobs.

use crate::error::DeliveryError;
use crate::model::Plan;

/// Subject line of invoice emails.
pub const INVOICE_SUBJECT: &str = "Your invoice";

/// Formats the plan price as dollars with two decimals (`3000` → `"$30.00"`).
///
/// Fails for negative amounts, which indicate a corrupted plan row.
pub fn invoice_amount(plan: &Plan) -> Result<String, DeliveryError> {
    if plan.amount_cents < 0 {
        return Err(DeliveryError::Invoice {
            error: format!(
                "plan {} has negative amount {}",
                plan.id, plan.amount_cents
            ),
        });
    }
    Ok(format!(
        "${}.{:02}",
        plan.amount_cents / 100,
        plan.amount_cents % 100
    ))
}

/// Plain-text invoice body.
pub fn invoice_body(plan: &Plan) -> Result<String, DeliveryError> {
    let amount = invoice_amount(plan)?;
    Ok(format!(
        "Thank you for subscribing to {}.\nAmount due: {amount}\n",
        plan.name
    ))
}
