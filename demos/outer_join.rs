/// Outer Join Example
///
/// This example demonstrates:
/// - Building an inner join as a view over two base tables
/// - Finding the unmatched rows with NOT IN
/// - Merging them into an outer view, where the missing side reads as NULL
/// - Index lookups through the outer view

use std::sync::Arc;
use tablealgebra::{
    in_rows, not_in_view, BaseTable, ColumnName, ColumnType, CompareOp, DataValue, OuterView, RowTable, Schema,
    TableField, TableName, VirtualView,
};

fn main() {
    println!("=== TableAlgebra Outer Join Example ===\n");

    // 1. Create users table
    println!("1. Creating users table...");
    let users = BaseTable::new(
        Schema::new(
            TableName::new("users"),
            vec![
                TableField::new("user_id", ColumnType::Int32).not_null(),
                TableField::new("name", ColumnType::String),
            ],
        )
        .unwrap(),
    );
    for (id, name) in [(1, "Alice"), (2, "Bob"), (3, "Charlie"), (4, "Diana")] {
        users.insert_row(vec![DataValue::Int32(id), name.into()]).unwrap();
    }
    println!("   Added {} users\n", users.row_count());

    // 2. Create orders table
    println!("2. Creating orders table...");
    let orders = BaseTable::new(
        Schema::new(
            TableName::new("orders"),
            vec![
                TableField::new("order_id", ColumnType::Int32).not_null(),
                TableField::new("user_id", ColumnType::Int32),
                TableField::new("product", ColumnType::String),
            ],
        )
        .unwrap(),
    );
    let orders_data = vec![
        (101, 1, "Laptop"),
        (102, 1, "Mouse"),
        (103, 3, "Keyboard"),
        (104, 3, "Monitor"),
        // Note: Bob (user_id=2) and Diana (user_id=4) have no orders
    ];
    for (order_id, user_id, product) in orders_data {
        orders
            .insert_row(vec![DataValue::Int32(order_id), DataValue::Int32(user_id), product.into()])
            .unwrap();
    }
    println!("   Added {} orders\n", orders.row_count());

    let users: Arc<dyn RowTable> = Arc::new(users);
    let orders: Arc<dyn RowTable> = Arc::new(orders);

    // 3. Inner join on user_id, one index probe per order
    println!("3. Inner join on user_id");
    let mut user_rows = Vec::new();
    let mut order_rows = Vec::new();
    for order in orders.row_enumeration() {
        let user_id = orders.cell(1, order).unwrap();
        for user in users.select_rows(0, CompareOp::Eq, &user_id).unwrap() {
            user_rows.push(user);
            order_rows.push(order);
        }
    }
    let inner: Arc<dyn RowTable> = Arc::new(
        VirtualView::new(vec![Arc::clone(&users), Arc::clone(&orders)], vec![user_rows, order_rows]).unwrap(),
    );
    println!("   {} matched rows", inner.row_count());
    println!(
        "   Users with orders: {}\n",
        in_rows(users.as_ref(), 0, orders.as_ref(), 1).unwrap().len()
    );

    // 4. Left outer join: merge in the users without orders
    println!("4. Left outer join");
    let unmatched = not_in_view(
        &users,
        orders.as_ref(),
        &ColumnName::parse("users.user_id"),
        &ColumnName::parse("orders.user_id"),
    )
    .unwrap();
    let mut outer = OuterView::new(&inner).unwrap();
    outer.merge_in(&(Arc::new(unmatched) as Arc<dyn RowTable>)).unwrap();
    println!("   {} users without orders come first\n", outer.outer_row_count());

    let name = outer.find_column(&ColumnName::parse("users.name")).unwrap();
    let product = outer.find_column(&ColumnName::parse("orders.product")).unwrap();
    for row in outer.row_enumeration() {
        let bought = match outer.cell(product, row).unwrap() {
            DataValue::Null => "NO ORDERS".to_string(),
            value => value.to_string(),
        };
        println!("      {} - {}", outer.cell(name, row).unwrap(), bought);
    }
    println!();

    // 5. Index lookups see the NULL rows
    println!("5. Rows with no product");
    let outer: Arc<dyn RowTable> = Arc::new(outer);
    for row in outer.select_rows(product, CompareOp::Eq, &DataValue::Null).unwrap() {
        println!("      {}", outer.cell(name, row).unwrap());
    }

    println!("\n=== Example Complete ===");
}
