//! Interpretation of a page POST.
//!
//! Control fields are `move`, `directjump`, `par` and `page_token`; every
//! other field is page data. At most one movement results.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::script::Movement;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("invalid jump position: {0:?}")]
    BadPosition(String),

    #[error("unsupported navigation: move={0:?}")]
    Unsupported(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationRequest {
    pub page_token: Option<String>,
    /// Submitted page fields.
    pub data: Map<String, Value>,
    /// `None` means stay on the current page.
    pub movement: Option<Movement>,
}

impl NavigationRequest {
    pub fn parse(mut values: HashMap<String, String>) -> Result<Self, NavigationError> {
        let page_token = values.remove("page_token");
        let movement = movement(
            values.remove("move").as_deref(),
            values.remove("directjump").as_deref(),
            values.remove("par").as_deref(),
        )?;
        let data = values
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();

        Ok(Self {
            page_token,
            data,
            movement,
        })
    }
}

fn movement(
    mv: Option<&str>,
    directjump: Option<&str>,
    par: Option<&str>,
) -> Result<Option<Movement>, NavigationError> {
    if mv.is_none() && directjump.is_none() && par.is_none() {
        return Ok(None);
    }
    if let (Some(dj), Some(par)) = (directjump, par)
        && !dj.is_empty()
    {
        return parse_position(par).map(|position| Some(Movement::Jump { position }));
    }
    match (mv, par) {
        (Some("started"), _) => Ok(None),
        (Some("forward"), _) => Ok(Some(Movement::Forward)),
        (Some("backward"), _) => Ok(Some(Movement::Backward)),
        (Some("jump"), Some(par)) => {
            parse_position(par).map(|position| Some(Movement::Jump { position }))
        }
        (mv, _) => Err(NavigationError::Unsupported(mv.map(String::from))),
    }
}

/// Parse `2.1.3` into `[2, 1, 3]`.
pub fn parse_position(par: &str) -> Result<Vec<usize>, NavigationError> {
    par.split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(NavigationError::BadPosition(par.to_string()));
            }
            part.parse()
                .map_err(|_| NavigationError::BadPosition(par.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_jump_position() {
        let req = NavigationRequest::parse(values(&[("move", "jump"), ("par", "2.1.3")])).unwrap();
        assert_eq!(req.movement, Some(Movement::Jump { position: vec![2, 1, 3] }));
    }

    #[test]
    fn test_forward_without_par() {
        let req = NavigationRequest::parse(values(&[("move", "forward")])).unwrap();
        assert_eq!(req.movement, Some(Movement::Forward));
    }

    #[test]
    fn test_backward() {
        let req = NavigationRequest::parse(values(&[("move", "backward")])).unwrap();
        assert_eq!(req.movement, Some(Movement::Backward));
    }

    #[test]
    fn test_nothing_means_no_movement() {
        let req = NavigationRequest::parse(HashMap::new()).unwrap();
        assert_eq!(req.movement, None);
        assert!(req.data.is_empty());
        assert!(req.page_token.is_none());
    }

    #[test]
    fn test_data_without_move_stays() {
        let req = NavigationRequest::parse(values(&[("age", "31"), ("page_token", "t")])).unwrap();
        assert_eq!(req.movement, None);
        assert_eq!(req.data.get("age"), Some(&Value::String("31".into())));
        assert_eq!(req.page_token.as_deref(), Some("t"));
        assert!(!req.data.contains_key("page_token"));
    }

    #[test]
    fn test_started_is_no_movement() {
        let req = NavigationRequest::parse(values(&[("move", "started")])).unwrap();
        assert_eq!(req.movement, None);
    }

    #[test]
    fn test_directjump() {
        let req = NavigationRequest::parse(values(&[("directjump", "1"), ("par", "4")])).unwrap();
        assert_eq!(req.movement, Some(Movement::Jump { position: vec![4] }));
    }

    #[test]
    fn test_control_fields_are_not_data() {
        let req = NavigationRequest::parse(values(&[
            ("move", "forward"),
            ("directjump", ""),
            ("par", ""),
            ("answer", "b"),
        ]))
        .unwrap();
        assert_eq!(req.movement, Some(Movement::Forward));
        assert_eq!(req.data.len(), 1);
    }

    #[test]
    fn test_malformed_requests() {
        for pairs in [
            vec![("move", "sideways")],
            vec![("move", "jump")],
            vec![("move", "jump"), ("par", "1..2")],
            vec![("move", "jump"), ("par", "-1")],
            vec![("move", "jump"), ("par", "a.b")],
            vec![("par", "1.2")],
            vec![("move", "")],
        ] {
            assert!(
                NavigationRequest::parse(values(&pairs)).is_err(),
                "accepted {pairs:?}"
            );
        }
    }

    #[test]
    fn test_parse_position_overflow() {
        assert!(parse_position("99999999999999999999999999").is_err());
        assert_eq!(parse_position("0"), Ok(vec![0]));
    }
}
