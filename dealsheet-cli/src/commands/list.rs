//! List command - show stored deals

use anyhow::Result;
use dealsheet_core::DealFilter;

use super::get_context;
use crate::output;

pub fn run(
    search: Option<String>,
    sector: Option<String>,
    transaction_type: Option<String>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let filter = DealFilter {
        search,
        sector,
        transaction_type,
        limit,
        ..Default::default()
    };
    let deals = ctx.query_service.list(&filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&deals)?);
        return Ok(());
    }

    if deals.is_empty() {
        println!("No deals found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Company", "Amount", "Date", "Type", "Stage", "Sector", "Geography"]);

    for deal in &deals {
        let f = &deal.fields;
        table.add_row(vec![
            f.company.clone().unwrap_or_default(),
            f.amount.map(output::format_money).unwrap_or_default(),
            f.investment_date.map(|d| d.to_string()).unwrap_or_default(),
            f.transaction_type.clone().unwrap_or_default(),
            f.investment_stage.clone().unwrap_or_default(),
            f.sector.clone().unwrap_or_default(),
            f.geography.clone().unwrap_or_default(),
        ]);
    }

    println!("{}", table);
    println!("{} deal(s)", deals.len());
    Ok(())
}
