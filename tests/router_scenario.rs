use std::cell::RefCell;

use pretty_assertions::assert_eq;
use roteiro::router::{Node, BEACH_SYSTEM_PROMPT, MOUNTAIN_SYSTEM_PROMPT};
use roteiro::{
    Category, ChatModel, ChatRequest, KeywordClassifier, LlmClassifier, ModelError, Role,
    RouterGraph,
};

/// Replies by persona and records every request it sees.
#[derive(Default)]
struct PersonaModel {
    classifier_reply: Option<&'static str>,
    requests: RefCell<Vec<ChatRequest>>,
}

impl PersonaModel {
    fn calls_with_system(&self, prompt: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|request| {
                request
                    .messages
                    .iter()
                    .any(|m| m.role == Role::System && m.content == prompt)
            })
            .count()
    }
}

impl ChatModel for PersonaModel {
    fn generate(&self, request: &ChatRequest) -> Result<String, ModelError> {
        self.requests.borrow_mut().push(request.clone());
        if request.response_schema.is_some() {
            return self
                .classifier_reply
                .map(str::to_string)
                .ok_or_else(|| ModelError::failed("classifier unavailable"));
        }
        let system = request
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        if system == BEACH_SYSTEM_PROMPT {
            Ok("Vá para Porto de Galinhas.".into())
        } else if system == MOUNTAIN_SYSTEM_PROMPT {
            Ok("Escale a Pedra da Gávea.".into())
        } else {
            Err(ModelError::failed("unexpected persona"))
        }
    }
}

#[test]
fn climbing_query_runs_only_the_mountain_expert() {
    let model = PersonaModel::default();
    let graph = RouterGraph::with_default_experts(KeywordClassifier, &model, 0.5).unwrap();

    let outcome = graph
        .invoke("Quero escalar montanhas no sul do Brasil")
        .unwrap();

    assert_eq!(outcome.category, Category::Mountain);
    assert_eq!(outcome.answer, "Escale a Pedra da Gávea.");
    assert_eq!(outcome.visited, vec![Node::Classify, Node::Mountain]);
    assert_eq!(model.calls_with_system(MOUNTAIN_SYSTEM_PROMPT), 1);
    assert_eq!(model.calls_with_system(BEACH_SYSTEM_PROMPT), 0);
}

#[test]
fn climbing_on_a_sunny_day_still_goes_to_the_mountain() {
    let model = PersonaModel::default();
    let graph = RouterGraph::with_default_experts(KeywordClassifier, &model, 0.5).unwrap();

    let outcome = graph.invoke("Quero escalar num dia de sol").unwrap();

    assert_eq!(outcome.category, Category::Mountain);
    assert_eq!(model.calls_with_system(MOUNTAIN_SYSTEM_PROMPT), 1);
    assert_eq!(model.calls_with_system(BEACH_SYSTEM_PROMPT), 0);
}

#[test]
fn beach_query_runs_only_the_beach_expert() {
    let model = PersonaModel::default();
    let graph = RouterGraph::with_default_experts(KeywordClassifier, &model, 0.5).unwrap();

    let outcome = graph.invoke("Quero férias em praias no Brasil.").unwrap();

    assert_eq!(outcome.category, Category::Beach);
    assert_eq!(model.calls_with_system(BEACH_SYSTEM_PROMPT), 1);
    assert_eq!(model.calls_with_system(MOUNTAIN_SYSTEM_PROMPT), 0);
}

#[test]
fn model_classifier_drives_the_route() {
    let model = PersonaModel {
        classifier_reply: Some(r#"{"destino": "montanha"}"#),
        ..Default::default()
    };
    let graph =
        RouterGraph::with_default_experts(LlmClassifier::new(&model), &model, 0.5).unwrap();

    let outcome = graph.invoke("Sugira uma viagem de inverno").unwrap();

    assert_eq!(outcome.category, Category::Mountain);
    assert_eq!(model.requests.borrow().len(), 2);
}

#[test]
fn unusable_classification_falls_back_to_default() {
    for reply in [Some(r#"{"destino": "deserto"}"#), Some("sem json"), None] {
        let model = PersonaModel {
            classifier_reply: reply,
            ..Default::default()
        };
        let graph =
            RouterGraph::with_default_experts(LlmClassifier::new(&model), &model, 0.5).unwrap();

        let outcome = graph.invoke("Quero escalar").unwrap();

        assert_eq!(outcome.category, Category::DEFAULT);
        assert_eq!(model.calls_with_system(BEACH_SYSTEM_PROMPT), 1);
    }
}

#[test]
fn expert_failure_surfaces_as_model_error() {
    struct Busy;
    impl ChatModel for Busy {
        fn generate(&self, _: &ChatRequest) -> Result<String, ModelError> {
            Err(ModelError::Overloaded {
                message: "503 UNAVAILABLE".into(),
            })
        }
    }

    let graph = RouterGraph::with_default_experts(KeywordClassifier, &Busy, 0.5).unwrap();
    let err = graph.invoke("praia").unwrap_err();
    assert!(err.model_error().is_some_and(ModelError::is_overloaded));
}
