//! Offer catalog seam
//!
//! The offer catalog is owned by another subsystem. The engine only needs a
//! read view of an offer's current content and price to seed overrides.

use crate::model::ContentItem;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Offer as exposed by the catalog
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Offer {
    #[serde(rename = "offerID")]
    pub offer_id: String,

    #[serde(default)]
    pub content: Vec<ContentItem>,

    /// Price in the catalog's own shape; pricing is computed elsewhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Value>,
}

/// Read access to the offer catalog
pub trait OfferCatalog: Send + Sync {
    /// Current content list of an offer
    fn content(&self, offer_id: &str) -> Option<Vec<ContentItem>>;

    /// Current price of an offer
    fn price(&self, offer_id: &str) -> Option<Value>;
}

/// Catalog snapshot held in memory
///
/// The service fills it at startup; callers may replace it at any time.
#[derive(Default)]
pub struct InMemoryOfferCatalog {
    offers: RwLock<HashMap<String, Offer>>,
}

impl InMemoryOfferCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offers(offers: Vec<Offer>) -> Self {
        let catalog = Self::new();
        catalog.replace_all(offers);
        catalog
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Offer>> {
        self.offers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Offer>> {
        self.offers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the whole snapshot
    pub fn replace_all(&self, offers: Vec<Offer>) {
        *self.write() = offers
            .into_iter()
            .map(|offer| (offer.offer_id.clone(), offer))
            .collect();
    }

    pub fn upsert(&self, offer: Offer) {
        self.write().insert(offer.offer_id.clone(), offer);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OfferCatalog for InMemoryOfferCatalog {
    fn content(&self, offer_id: &str) -> Option<Vec<ContentItem>> {
        self.read().get(offer_id).map(|offer| offer.content.clone())
    }

    fn price(&self, offer_id: &str) -> Option<Value> {
        self.read().get(offer_id).and_then(|offer| offer.price.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn starter_pack() -> Offer {
        Offer {
            offer_id: "starter_pack".to_string(),
            content: vec![ContentItem {
                entity_id: "gems".to_string(),
                amount: 100,
            }],
            price: Some(json!({ "currency": "USD", "amount": 4.99 })),
        }
    }

    #[test]
    fn test_lookup_returns_copies() {
        let catalog = InMemoryOfferCatalog::with_offers(vec![starter_pack()]);

        let mut content = catalog.content("starter_pack").unwrap();
        content[0].amount = 1;

        // Mutating the returned list leaves the catalog untouched
        assert_eq!(catalog.content("starter_pack").unwrap()[0].amount, 100);
        assert_eq!(
            catalog.price("starter_pack"),
            Some(json!({ "currency": "USD", "amount": 4.99 }))
        );
        assert!(catalog.content("missing").is_none());
    }

    #[test]
    fn test_replace_all_drops_old_offers() {
        let catalog = InMemoryOfferCatalog::with_offers(vec![starter_pack()]);
        catalog.replace_all(vec![Offer {
            offer_id: "daily_deal".to_string(),
            content: vec![],
            price: None,
        }]);

        assert_eq!(catalog.len(), 1);
        assert!(catalog.content("starter_pack").is_none());
        assert_eq!(catalog.content("daily_deal"), Some(vec![]));
    }

    #[test]
    fn test_refresh_survives_poisoned_lock() {
        let catalog = std::sync::Arc::new(InMemoryOfferCatalog::with_offers(vec![starter_pack()]));

        let poisoner = catalog.clone();
        let panicked = std::thread::spawn(move || {
            let _guard = poisoner.offers.write().unwrap();
            panic!("poison the catalog lock");
        })
        .join();
        assert!(panicked.is_err());
        assert!(catalog.offers.is_poisoned());

        catalog.upsert(Offer {
            offer_id: "daily_deal".to_string(),
            content: vec![],
            price: None,
        });
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.content("starter_pack").unwrap()[0].amount, 100);

        catalog.replace_all(vec![]);
        assert!(catalog.is_empty());
    }
}
