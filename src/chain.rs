//! Single-shot itinerary prompt and the city → restaurants → culture chain.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::error::{ModelError, ParseError, PromptError};
use crate::llm::{invoke_text, ChatModel};
use crate::parser::{FieldSpec, JsonOutputParser, StrOutputParser};
use crate::prompt::{PromptTemplate, Vars};

const ITINERARY_TEMPLATE: &str = "
    Crie um roteiro de viagem de {dias} dias,
    para uma família com {numero_criancas} crianças,
    que gostam de {atividade}
    ";

const CITY_TEMPLATE: &str = "
    Sugira uma cidade dado o meu interesse por {interesse},
    {formato_de_saida}
    ";

const RESTAURANTS_TEMPLATE: &str = "
    Sugira restaurantes populares entre locais em {cidade},
    {formato_de_saida}
    ";

const CULTURE_TEMPLATE: &str = "Sugira atividades e locais culturais em {cidade}";

/// Inputs for the itinerary prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItineraryRequest {
    /// Trip length in days.
    pub days: u32,
    /// Number of children travelling.
    pub children: u32,
    /// Activity the family enjoys.
    pub activity: String,
}

impl Default for ItineraryRequest {
    fn default() -> Self {
        Self {
            days: 7,
            children: 2,
            activity: "praia".to_string(),
        }
    }
}

/// Itinerary template with `dias`, `numero_criancas` and `atividade` inputs.
pub fn itinerary_prompt() -> Result<PromptTemplate, PromptError> {
    PromptTemplate::new(ITINERARY_TEMPLATE)
}

/// Renders the itinerary prompt for `request`.
pub fn render_itinerary(request: &ItineraryRequest) -> Result<String, PromptError> {
    let vars = Vars::new()
        .set("dias", request.days)
        .set("numero_criancas", request.children)
        .set("atividade", &request.activity);
    itinerary_prompt()?.format(&vars)
}

/// Renders the itinerary prompt and sends it. Returns `(prompt, reply)`.
pub fn plan_itinerary<M: ChatModel + ?Sized>(
    model: &M,
    temperature: f32,
    request: &ItineraryRequest,
) -> Result<(String, String), ChainError> {
    let prompt = render_itinerary(request)?;
    let reply = invoke_text(model, &prompt, temperature)?;
    Ok((prompt, reply))
}

/// City suggested for an interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Recommended city.
    pub cidade: String,
    /// Why the city is worth visiting.
    pub motivo: String,
}

/// Restaurants suggested for a city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurants {
    /// City the restaurants are in.
    pub cidade: String,
    /// Recommended restaurants.
    pub motivo: String,
}

/// Every intermediate value produced by [`TravelChain::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutcome {
    /// First step output.
    pub destination: Destination,
    /// Second step output.
    pub restaurants: Restaurants,
    /// Final free-text answer.
    pub cultural_tips: String,
}

/// Failures raised by the chain steps.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Template rendering failed.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// The remote call failed.
    #[error(transparent)]
    Model(#[from] ModelError),
    /// The reply could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ChainError {
    /// Returns the model error when the failure came from the remote call.
    pub fn model_error(&self) -> Option<&ModelError> {
        match self {
            Self::Model(err) => Some(err),
            _ => None,
        }
    }
}

/// Three prompts chained so each step's `cidade` feeds the next.
pub struct TravelChain<'m, M: ?Sized> {
    model: &'m M,
    temperature: f32,
    city_prompt: PromptTemplate,
    restaurants_prompt: PromptTemplate,
    culture_prompt: PromptTemplate,
    destination_parser: JsonOutputParser<Destination>,
    restaurants_parser: JsonOutputParser<Restaurants>,
}

impl<'m, M: ChatModel + ?Sized> TravelChain<'m, M> {
    /// Builds the chain around `model`.
    pub fn new(model: &'m M, temperature: f32) -> Result<Self, PromptError> {
        let destination_parser = JsonOutputParser::new(&[
            FieldSpec::new("cidade", "A cidade recomendada para visitar"),
            FieldSpec::new(
                "motivo",
                "motivo pelo qual é interessante visitar essa cidade",
            ),
        ]);
        let restaurants_parser = JsonOutputParser::new(&[
            FieldSpec::new("cidade", "A cidade recomendada para visitar"),
            FieldSpec::new("motivo", "Restaurantes recomendados na cidade"),
        ]);
        let city_prompt = PromptTemplate::new(CITY_TEMPLATE)?
            .with_partial("formato_de_saida", destination_parser.format_instructions());
        let restaurants_prompt = PromptTemplate::new(RESTAURANTS_TEMPLATE)?
            .with_partial("formato_de_saida", restaurants_parser.format_instructions());
        Ok(Self {
            model,
            temperature,
            city_prompt,
            restaurants_prompt,
            culture_prompt: PromptTemplate::new(CULTURE_TEMPLATE)?,
            destination_parser,
            restaurants_parser,
        })
    }

    /// Step 1: pick a city for an interest.
    pub fn suggest_city(&self, interest: &str) -> Result<Destination, ChainError> {
        let prompt = self
            .city_prompt
            .format(&Vars::new().set("interesse", interest))?;
        let reply = invoke_text(self.model, &prompt, self.temperature)?;
        Ok(self.destination_parser.parse(&reply)?)
    }

    /// Step 2: restaurants popular with locals in the chosen city.
    pub fn suggest_restaurants(&self, destination: &Destination) -> Result<Restaurants, ChainError> {
        let prompt = self
            .restaurants_prompt
            .format(&Vars::new().set("cidade", &destination.cidade))?;
        let reply = invoke_text(self.model, &prompt, self.temperature)?;
        Ok(self.restaurants_parser.parse(&reply)?)
    }

    /// Step 3: cultural activities in the city.
    pub fn cultural_tips(&self, restaurants: &Restaurants) -> Result<String, ChainError> {
        let prompt = self
            .culture_prompt
            .format(&Vars::new().set("cidade", &restaurants.cidade))?;
        let reply = invoke_text(self.model, &prompt, self.temperature)?;
        Ok(StrOutputParser.parse(&reply))
    }

    /// Runs all three steps in order.
    pub fn run(&self, interest: &str) -> Result<ChainOutcome, ChainError> {
        let destination = self.suggest_city(interest)?;
        info!(city = %destination.cidade, "destination chosen");
        let restaurants = self.suggest_restaurants(&destination)?;
        info!(city = %restaurants.cidade, "restaurants suggested");
        let cultural_tips = self.cultural_tips(&restaurants)?;
        Ok(ChainOutcome {
            destination,
            restaurants,
            cultural_tips,
        })
    }
}
