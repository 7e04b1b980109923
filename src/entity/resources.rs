//! The admin API's resources: raw server shapes and their display rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::lenient::{self, image_url, label};
use super::Resource;
use crate::remote::Encoding;

// ============================================================================
// Catalogue
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  #[serde(default, deserialize_with = "lenient::text")]
  pub name: String,
  #[serde(default, deserialize_with = "lenient::text")]
  pub sku: String,
  #[serde(default, deserialize_with = "lenient::number")]
  pub price: f64,
  #[serde(default, deserialize_with = "lenient::number")]
  pub discount_price: f64,
  #[serde(default, deserialize_with = "lenient::integer")]
  pub stock: i64,
  #[serde(default)]
  pub category: Value,
  #[serde(default)]
  pub sub_category: Value,
  #[serde(default)]
  pub brand: Value,
  #[serde(default, deserialize_with = "lenient::list")]
  pub images: Vec<Value>,
  #[serde(default, deserialize_with = "lenient::flag")]
  pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRow {
  pub name: String,
  pub sku: String,
  pub price: f64,
  /// Price after discount; equals `price` when there is none
  pub sale_price: f64,
  pub stock: i64,
  pub category: String,
  pub sub_category: String,
  pub brand: String,
  pub image: String,
  pub image_count: usize,
  pub active: bool,
}

impl Resource for Product {
  type Row = ProductRow;
  const NAME: &'static str = "product";
  const ENCODING: Encoding = Encoding::Multipart;

  fn project(self) -> ProductRow {
    let sale_price = if self.discount_price > 0.0 && self.discount_price < self.price {
      self.discount_price
    } else {
      self.price
    };
    ProductRow {
      name: self.name,
      sku: self.sku,
      price: self.price,
      sale_price,
      stock: self.stock,
      category: label(&self.category),
      sub_category: label(&self.sub_category),
      brand: label(&self.brand),
      image: self.images.first().map(image_url).unwrap_or_default(),
      image_count: self.images.len(),
      active: self.is_active,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  #[serde(default, deserialize_with = "lenient::text")]
  pub name: String,
  #[serde(default, deserialize_with = "lenient::text")]
  pub description: String,
  #[serde(default)]
  pub category_type: Value,
  #[serde(default)]
  pub image: Value,
  #[serde(default, deserialize_with = "lenient::flag")]
  pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRow {
  pub name: String,
  pub description: String,
  pub category_type: String,
  pub image: String,
  pub active: bool,
}

impl Resource for Category {
  type Row = CategoryRow;
  const NAME: &'static str = "category";
  const ENCODING: Encoding = Encoding::Multipart;

  fn project(self) -> CategoryRow {
    CategoryRow {
      name: self.name,
      description: self.description,
      category_type: label(&self.category_type),
      image: image_url(&self.image),
      active: self.is_active,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubCategory {
  #[serde(default, deserialize_with = "lenient::text")]
  pub name: String,
  #[serde(default)]
  pub category: Value,
  #[serde(default)]
  pub image: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubCategoryRow {
  pub name: String,
  pub category: String,
  pub image: String,
}

impl Resource for SubCategory {
  type Row = SubCategoryRow;
  const NAME: &'static str = "subCategory";
  const ENCODING: Encoding = Encoding::Multipart;

  fn project(self) -> SubCategoryRow {
    SubCategoryRow {
      name: self.name,
      category: label(&self.category),
      image: image_url(&self.image),
    }
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryType {
  #[serde(default, deserialize_with = "lenient::text")]
  pub name: String,
  #[serde(default, deserialize_with = "lenient::text")]
  pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTypeRow {
  pub name: String,
  pub description: String,
}

impl Resource for CategoryType {
  type Row = CategoryTypeRow;
  const NAME: &'static str = "categoryType";

  fn project(self) -> CategoryTypeRow {
    CategoryTypeRow {
      name: self.name,
      description: self.description,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct Brand {
  #[serde(default, deserialize_with = "lenient::text")]
  pub name: String,
  #[serde(default, deserialize_with = "lenient::text")]
  pub description: String,
  #[serde(default)]
  pub logo: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrandRow {
  pub name: String,
  pub description: String,
  pub logo: String,
}

impl Resource for Brand {
  type Row = BrandRow;
  const NAME: &'static str = "brand";
  const ENCODING: Encoding = Encoding::Multipart;

  fn project(self) -> BrandRow {
    BrandRow {
      name: self.name,
      description: self.description,
      logo: image_url(&self.logo),
    }
  }
}

// ============================================================================
// Gifting metadata: occasions, recipients, packaging, colors
// ============================================================================

/// Shape shared by occasions and recipients.
#[derive(Debug, Default, Deserialize)]
pub struct Tag {
  #[serde(default, deserialize_with = "lenient::text")]
  pub name: String,
  #[serde(default, deserialize_with = "lenient::text")]
  pub description: String,
  #[serde(default)]
  pub image: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagRow {
  pub name: String,
  pub description: String,
  pub image: String,
}

impl From<Tag> for TagRow {
  fn from(tag: Tag) -> Self {
    TagRow {
      name: tag.name,
      description: tag.description,
      image: image_url(&tag.image),
    }
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct Occasion(pub Tag);

impl Resource for Occasion {
  type Row = TagRow;
  const NAME: &'static str = "occasion";
  const ENCODING: Encoding = Encoding::Multipart;

  fn project(self) -> TagRow {
    self.0.into()
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct Recipient(pub Tag);

impl Resource for Recipient {
  type Row = TagRow;
  const NAME: &'static str = "recipient";
  const ENCODING: Encoding = Encoding::Multipart;

  fn project(self) -> TagRow {
    self.0.into()
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct Packaging {
  #[serde(default, deserialize_with = "lenient::text")]
  pub name: String,
  #[serde(default, deserialize_with = "lenient::text")]
  pub description: String,
  #[serde(default, deserialize_with = "lenient::number")]
  pub price: f64,
  #[serde(default)]
  pub image: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackagingRow {
  pub name: String,
  pub description: String,
  pub price: f64,
  pub image: String,
}

impl Resource for Packaging {
  type Row = PackagingRow;
  const NAME: &'static str = "packaging";
  const ENCODING: Encoding = Encoding::Multipart;

  fn project(self) -> PackagingRow {
    PackagingRow {
      name: self.name,
      description: self.description,
      price: self.price,
      image: image_url(&self.image),
    }
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Color {
  #[serde(default, deserialize_with = "lenient::text")]
  pub name: String,
  #[serde(default, alias = "hex", deserialize_with = "lenient::text")]
  pub color_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorRow {
  pub name: String,
  pub hex: String,
}

impl Resource for Color {
  type Row = ColorRow;
  const NAME: &'static str = "color";

  fn project(self) -> ColorRow {
    let hex = match self.color_code.trim() {
      "" => String::new(),
      code if code.starts_with('#') => code.to_lowercase(),
      code => format!("#{}", code.to_lowercase()),
    };
    ColorRow {
      name: self.name,
      hex,
    }
  }
}

// ============================================================================
// Sales: orders and users
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  #[serde(default, alias = "orderId", deserialize_with = "lenient::text")]
  pub order_number: String,
  #[serde(default)]
  pub user: Value,
  #[serde(default, alias = "items", deserialize_with = "lenient::list")]
  pub products: Vec<Value>,
  #[serde(default, deserialize_with = "lenient::number")]
  pub total_amount: f64,
  #[serde(default, deserialize_with = "lenient::text")]
  pub status: String,
  #[serde(default, deserialize_with = "lenient::text")]
  pub payment_status: String,
  #[serde(default, deserialize_with = "lenient::text")]
  pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRow {
  pub number: String,
  pub customer: String,
  pub item_count: i64,
  pub total: f64,
  pub status: String,
  pub payment_status: String,
  pub placed_at: String,
}

impl Resource for Order {
  type Row = OrderRow;
  const NAME: &'static str = "order";

  fn project(self) -> OrderRow {
    // Line items carry a quantity; a bare product reference counts once
    let item_count = self
      .products
      .iter()
      .map(|line| {
        line
          .get("quantity")
          .and_then(Value::as_i64)
          .filter(|q| *q > 0)
          .unwrap_or(1)
      })
      .sum();
    OrderRow {
      number: self.order_number,
      customer: label(&self.user),
      item_count,
      total: self.total_amount,
      status: self.status,
      payment_status: self.payment_status,
      placed_at: self.created_at,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  #[serde(default, deserialize_with = "lenient::text")]
  pub name: String,
  #[serde(default, deserialize_with = "lenient::text")]
  pub first_name: String,
  #[serde(default, deserialize_with = "lenient::text")]
  pub last_name: String,
  #[serde(default, deserialize_with = "lenient::text")]
  pub email: String,
  #[serde(default, alias = "mobile", deserialize_with = "lenient::text")]
  pub phone: String,
  #[serde(default, deserialize_with = "lenient::text")]
  pub role: String,
  #[serde(default, deserialize_with = "lenient::flag")]
  pub is_blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRow {
  pub name: String,
  pub email: String,
  pub phone: String,
  pub role: String,
  pub active: bool,
}

impl Resource for User {
  type Row = UserRow;
  const NAME: &'static str = "user";

  fn project(self) -> UserRow {
    let name = if self.name.is_empty() {
      format!("{} {}", self.first_name, self.last_name)
        .trim()
        .to_string()
    } else {
      self.name
    };
    UserRow {
      name,
      email: self.email,
      phone: self.phone,
      role: self.role,
      active: !self.is_blocked,
    }
  }
}
