use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::order::{items_total, OrderItem};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<OrderItem>,
    pub total: Decimal,
}

impl Cart {
    /// Adds a line, merging quantities when the food item is already present.
    /// The cart is left untouched when the result would overflow.
    pub fn add(&mut self, item: OrderItem) -> Result<(), AppError> {
        let mut items = self.items.clone();
        match items.iter_mut().find(|line| line.food_id == item.food_id) {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or_else(|| AppError::Validation(format!("quantity for {} overflows", item.name)))?;
            }
            None => items.push(item),
        }
        self.replace(items)
    }

    /// Returns false when the food item is not in the cart.
    pub fn set_quantity(&mut self, food_id: &str, quantity: u32) -> Result<bool, AppError> {
        let mut items = self.items.clone();
        let Some(line) = items.iter_mut().find(|line| line.food_id == food_id) else {
            return Ok(false);
        };
        line.quantity = quantity;
        self.replace(items)?;
        Ok(true)
    }

    pub fn remove(&mut self, food_id: &str) -> Result<bool, AppError> {
        let before = self.items.len();
        let items: Vec<OrderItem> = self
            .items
            .iter()
            .filter(|line| line.food_id != food_id)
            .cloned()
            .collect();
        let removed = items.len() != before;
        self.replace(items)?;
        Ok(removed)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn replace(&mut self, items: Vec<OrderItem>) -> Result<(), AppError> {
        self.total = items_total(&items)?;
        self.items = items;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::Cart;
    use crate::error::AppError;
    use crate::models::order::OrderItem;

    fn item(food_id: &str, price: i64, quantity: u32) -> OrderItem {
        OrderItem {
            food_id: food_id.to_string(),
            name: food_id.to_string(),
            price: Decimal::from(price),
            quantity,
            image: None,
        }
    }

    #[test]
    fn adding_same_food_merges_quantity() {
        let mut cart = Cart::default();
        cart.add(item("biryani", 100, 1)).unwrap();
        cart.add(item("biryani", 100, 1)).unwrap();
        cart.add(item("lassi", 50, 1)).unwrap();

        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.items[0].quantity, 2);
        assert_eq!(cart.total, Decimal::from(250));
    }

    #[test]
    fn quantity_update_and_removal_recompute_total() {
        let mut cart = Cart::default();
        cart.add(item("biryani", 100, 1)).unwrap();
        cart.add(item("lassi", 50, 1)).unwrap();

        assert!(cart.set_quantity("lassi", 3).unwrap());
        assert_eq!(cart.total, Decimal::from(250));

        assert!(cart.remove("biryani").unwrap());
        assert_eq!(cart.total, Decimal::from(150));
        assert!(!cart.remove("biryani").unwrap());
        assert!(!cart.set_quantity("missing", 1).unwrap());
    }

    #[test]
    fn overflowing_line_is_rejected_and_cart_kept() {
        let mut cart = Cart::default();
        cart.add(item("biryani", 100, 1)).unwrap();

        let huge = OrderItem {
            price: Decimal::MAX,
            ..item("platter", 1, 2)
        };
        assert!(matches!(cart.add(huge), Err(AppError::Validation(_))));
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.total, Decimal::from(100));

        let mut platter_only = Cart::default();
        platter_only
            .add(OrderItem { price: Decimal::MAX, ..item("platter", 1, 1) })
            .unwrap();
        assert!(matches!(platter_only.set_quantity("platter", 2), Err(AppError::Validation(_))));
        assert_eq!(platter_only.items[0].quantity, 1);
        assert_eq!(platter_only.total, Decimal::MAX);
    }

    #[test]
    fn merged_quantity_overflow_is_rejected() {
        let mut cart = Cart::default();
        cart.add(item("lassi", 0, u32::MAX)).unwrap();

        assert!(matches!(cart.add(item("lassi", 0, 1)), Err(AppError::Validation(_))));
        assert_eq!(cart.items[0].quantity, u32::MAX);
    }
}
