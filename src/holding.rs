use serde::Deserialize;
use std::fs::File;
use std::io::Read;

/// A static stock position. Loaded once from the holdings file and never
/// mutated afterwards; identity within the dataset is the ticker symbol.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    name: String,
    symbol: String,
    purchase_price: f64,
    qty: u32,
    exchange: String,
    sector: String,
}

impl Holding {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_symbol(&self) -> &str {
        &self.symbol
    }

    pub fn get_purchase_price(&self) -> f64 {
        self.purchase_price
    }

    pub fn get_qty(&self) -> u32 {
        self.qty
    }

    pub fn get_exchange(&self) -> &str {
        &self.exchange
    }

    pub fn get_sector(&self) -> &str {
        &self.sector
    }

    /// Capital invested in this position: qty x purchase price.
    pub fn investment(&self) -> f64 {
        self.qty as f64 * self.purchase_price
    }

    #[cfg(test)]
    pub fn sample(symbol: &str, qty: u32, purchase_price: f64, sector: &str) -> Holding {
        Holding {
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            purchase_price,
            qty,
            exchange: "NSE".to_string(),
            sector: sector.to_string(),
        }
    }
}

pub fn from_string(data: &str) -> Vec<Holding> {
    serde_json::from_str::<Vec<Holding>>(data).expect("JSON was not well-formatted")
}

pub fn from_file(filename: &str) -> Vec<Holding> {
    let mut file = File::open(filename).expect("file not found");
    let mut data = String::new();
    file.read_to_string(&mut data)
        .expect("something went wrong reading the file");
    from_string(&data)
}
