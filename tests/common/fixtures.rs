//! Tariff payloads as the upstream API sends them

use serde_json::{json, Value};
use tariff_sync::models::BoxTariffResponse;

/// One warehouse entry with comma decimals
pub fn warehouse_json(name: &str, geo: &str, storage_coef: &str) -> Value {
    json!({
        "warehouseName": name,
        "geoName": geo,
        "boxDeliveryBase": "46",
        "boxDeliveryCoefExpr": "115",
        "boxDeliveryLiter": "11,2",
        "boxDeliveryMarketplaceBase": "-",
        "boxDeliveryMarketplaceCoefExpr": "",
        "boxDeliveryMarketplaceLiter": "-",
        "boxStorageBase": "0,14",
        "boxStorageCoefExpr": storage_coef,
        "boxStorageLiter": "0,07"
    })
}

/// Full response body with the given warehouse entries
pub fn tariff_body(warehouses: Vec<Value>) -> Value {
    json!({
        "response": {
            "data": {
                "dtNextBox": "2025-03-02",
                "dtTillMax": "2025-03-31",
                "warehouseList": warehouses
            }
        }
    })
}

/// Two warehouses with storage coefficients 130 and 100
pub fn sample_body() -> Value {
    tariff_body(vec![
        warehouse_json("Коледино", "Центральный федеральный округ", "130"),
        warehouse_json("Казань", "Приволжский федеральный округ", "100"),
    ])
}

pub fn sample_response() -> BoxTariffResponse {
    parse(sample_body())
}

pub fn parse(body: Value) -> BoxTariffResponse {
    serde_json::from_value(body).expect("fixture must match the response shape")
}
