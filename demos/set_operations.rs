/// Set Operations Example
///
/// This example demonstrates:
/// - UNION, UNION ALL, INTERSECT and EXCEPT over two tables
/// - IN and NOT IN semi-joins
/// - Aliasing a table with a filter view

use std::sync::Arc;
use tablealgebra::{
    in_rows, not_in_rows, BaseTable, ColumnType, CompareOp, CompositeOp, CompositeView, DataValue, FilterView, RowTable,
    Schema, TableField, TableName,
};

fn cities(name: &str, values: &[&str]) -> Arc<dyn RowTable> {
    let table = BaseTable::new(Schema::new(TableName::new(name), vec![TableField::new("city", ColumnType::String)]).unwrap());
    for city in values {
        table.insert_row(vec![(*city).into()]).unwrap();
    }
    Arc::new(table)
}

fn print_column(label: &str, table: &dyn RowTable) {
    let values: Vec<String> = table
        .row_enumeration()
        .map(|row| table.cell(0, row).unwrap().to_string())
        .collect();
    println!("   {:<10} ({} rows): {}", label, values.len(), values.join(", "));
}

fn main() {
    println!("=== TableAlgebra Set Operations Example ===\n");

    let customers = cities("customers", &["Paris", "Oslo", "Lima", "Oslo"]);
    let suppliers = cities("suppliers", &["Lima", "Cairo", "Oslo"]);

    println!("1. Inputs");
    print_column("customers", customers.as_ref());
    print_column("suppliers", suppliers.as_ref());
    println!();

    println!("2. Composite operators");
    for (keyword, keep_all) in [("UNION", false), ("UNION", true), ("INTERSECT", false), ("EXCEPT", false)] {
        let op = CompositeOp::from_str(keyword).unwrap();
        let mut view = CompositeView::from_tables(vec![Arc::clone(&customers), Arc::clone(&suppliers)]).unwrap();
        view.setup_composite(op, keep_all).unwrap();
        let label = if keep_all { format!("{} ALL", op) } else { op.to_string() };
        print_column(&label, &view);
    }
    println!();

    println!("3. Semi-joins");
    let hits = in_rows(customers.as_ref(), 0, suppliers.as_ref(), 0).unwrap();
    let misses = not_in_rows(customers.as_ref(), 0, suppliers.as_ref(), 0).unwrap();
    println!("   customer rows IN suppliers:     {:?}", hits);
    println!("   customer rows NOT IN suppliers: {:?}", misses);
    println!();

    println!("4. Filter view");
    let alias = FilterView::new(Arc::clone(&customers), TableName::new("c"));
    println!("   '{}' exposes {} rows of '{}'", alias.name(), alias.row_count(), customers.name());
    let oslo = alias.parent().select_rows(0, CompareOp::Eq, &DataValue::from("Oslo")).unwrap();
    println!("   Oslo rows: {:?}", oslo);

    println!("\n=== Example Complete ===");
}
