use serde::{Deserialize, Serialize};

/// One stock line as callers see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockItem {
    pub stock_id: u32,
    pub description: String,
}

/// Response body for `GET /stock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockResponse {
    pub stock: Vec<StockItem>,
}

/// The catalog served while no inventory backend is wired up.
pub fn seed_catalog() -> Vec<StockItem> {
    vec![
        StockItem {
            stock_id: 1,
            description: "hand soap".to_string(),
        },
        StockItem {
            stock_id: 2,
            description: "toothpaste".to_string(),
        },
        StockItem {
            stock_id: 3,
            description: "shower gel".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_items_serialize_with_camel_case_id() {
        let response = StockResponse {
            stock: vec![StockItem {
                stock_id: 42,
                description: "sponge".to_string(),
            }],
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["stock"][0]["stockId"], 42);
        assert_eq!(json["stock"][0]["description"], "sponge");
    }
}
