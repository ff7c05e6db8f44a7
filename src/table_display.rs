use tabled::{settings::Style, Table};

use crate::core::types::Opportunity;

/// 以表格形式渲染套利机会
pub fn render_opportunities(opportunities: &[Opportunity]) -> String {
    let mut output = String::new();
    output.push_str("\n🔍 当前套利机会:\n");
    output.push_str(&Table::new(opportunities).with(Style::rounded()).to_string());
    output.push('\n');
    output
}
