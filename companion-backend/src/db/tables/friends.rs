//! Relationship records

use crate::db::{Database, Filter, FRIENDS};
use crate::error::StoreError;
use crate::models::{Friend, UserRef};
use serde_json::Value;

impl Database {
    pub fn get_friend(&self, user_id: &str) -> Result<Option<Friend>, StoreError> {
        let doc = self
            .store()
            .find_one(FRIENDS, &Filter::all().eq("userId", user_id))?;
        doc.map(|doc| -> Result<Friend, StoreError> {
            let mut friend: Friend = doc.decode()?;
            friend.doc_id = doc.id;
            Ok(friend)
        })
        .transpose()
    }

    /// Get or create the record for `user`, refreshing the stored user snapshot
    pub fn touch_friend(&self, user: &UserRef) -> Result<Friend, StoreError> {
        self.upsert_friend(user, |_| {})
    }

    pub fn inc_love(&self, user: &UserRef, amount: f64) -> Result<Friend, StoreError> {
        self.upsert_friend(user, |friend| friend.inc_love(amount))
    }

    /// Replace one module's sub-document on a user's record
    pub fn set_friend_module_data(
        &self,
        user_id: &str,
        module: &str,
        data: Value,
    ) -> Result<(), StoreError> {
        let mut data = Some(data);
        let updated = self.modify_friend(user_id, None, |friend| {
            if let Some(data) = data.take() {
                friend.per_modules_data.insert(module.to_string(), data);
            }
        })?;
        match updated {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                collection: FRIENDS.to_string(),
                id: 0,
            }),
        }
    }

    fn upsert_friend(
        &self,
        user: &UserRef,
        mut change: impl FnMut(&mut Friend),
    ) -> Result<Friend, StoreError> {
        let seed = serde_json::to_value(Friend::new(user.clone()))?;
        let friend = self.modify_friend(&user.id, Some(seed), |friend| {
            // Chat follow-ups and notifications may carry only the id
            if !user.username.is_empty() && friend.user != *user {
                friend.user = user.clone();
            }
            change(friend);
        })?;
        friend.ok_or_else(|| StoreError::NotFound {
            collection: FRIENDS.to_string(),
            id: 0,
        })
    }

    /// Decode, change and store one record under the store's lock
    fn modify_friend(
        &self,
        user_id: &str,
        seed: Option<Value>,
        mut change: impl FnMut(&mut Friend),
    ) -> Result<Option<Friend>, StoreError> {
        let doc = self.store().modify(
            FRIENDS,
            &Filter::all().eq("userId", user_id),
            seed,
            &mut |body: &mut Value| {
                let mut friend: Friend = serde_json::from_value(body.clone())?;
                change(&mut friend);
                *body = serde_json::to_value(&friend)?;
                Ok(())
            },
        )?;

        doc.map(|doc| -> Result<Friend, StoreError> {
            let mut friend: Friend = doc.decode()?;
            friend.doc_id = doc.id;
            Ok(friend)
        })
        .transpose()
    }
}
