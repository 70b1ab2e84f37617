//! ERP batch-import process client.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use punchsync_core::ErpImporter;
use punchsync_domain::constants::{
    ERP_CLOCK_LAYOUT, ERP_PROCESS_ACTION, ERP_PROCESS_LABEL, ERP_PROCESS_SERVER, ERP_PROCESS_USER,
};
use punchsync_domain::{ErpConfig, ImportProcessRequest, PunchSyncError, Result};
use reqwest::Method;
use serde::Serialize;
use tracing::debug;

use crate::errors::InfraError;
use crate::http::HttpClient;

// Fixed selection filters of the import procedure; the ERP rejects the call
// when any of them is missing.
const RECEIPT_CODES: &str = "DHMOPQST";
const SITUATION_CODES: &str = "ADEFILMOPRSTUVWZ";
const TYPE_CODES: &str = "ABCDEFIMNOPRSUXZ";
const SECTION_BREAK_MASK: &str = "???????????????";

/// Client for the ERP REST process endpoint.
pub struct ErpProcessClient {
    http: HttpClient,
    base_url: String,
    username: String,
    password: String,
}

impl ErpProcessClient {
    pub fn new(config: &ErpConfig, http: HttpClient) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

#[async_trait]
impl ErpImporter for ErpProcessClient {
    async fn execute_import(&self, request: &ImportProcessRequest) -> Result<String> {
        let descriptor = ProcessDescriptor::for_request(request);
        let url = format!(
            "{}/rest/restprocess/executeprocess/{}",
            self.base_url, ERP_PROCESS_SERVER
        );

        debug!(
            company = request.company_code,
            terminal = request.terminal_code,
            file_path = %request.file_path,
            "triggering ERP batch import"
        );

        let builder = self
            .http
            .request(Method::POST, url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&descriptor);

        let response = self.http.send(builder).await?;
        let response = response.error_for_status().map_err(map_http_error)?;
        response.text().await.map_err(map_http_error)
    }
}

/// Wire descriptor of the batch-import procedure call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessDescriptor {
    action_module: &'static str,
    action_name: &'static str,
    process_name: &'static str,
    server_name: &'static str,
    cod_usuario: &'static str,
    cod_coligada: i64,
    codigo_layout_relogio: &'static str,
    data_inicio_importacao: String,
    data_fim_importacao: String,
    acerta_natureza: &'static str,
    terminal_coleta: String,
    file_path: String,
    natureza_fixa: &'static str,
    tipo_importacao: &'static str,
    tempo_minimo_entre_batidas: &'static str,
    quebra_secao: &'static str,
    selecao: Selection,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Selection {
    cod_recebimento: &'static str,
    cod_situacao: &'static str,
    cod_tipo: &'static str,
    contexto: Context,
}

#[derive(Debug, Serialize)]
struct Context {
    #[serde(rename = "_params")]
    params: String,
}

impl ProcessDescriptor {
    fn for_request(request: &ImportProcessRequest) -> Self {
        let reference = erp_datetime(request.reference_date);

        Self {
            action_module: "A",
            action_name: ERP_PROCESS_ACTION,
            process_name: ERP_PROCESS_LABEL,
            server_name: ERP_PROCESS_SERVER,
            cod_usuario: ERP_PROCESS_USER,
            cod_coligada: request.company_code,
            codigo_layout_relogio: ERP_CLOCK_LAYOUT,
            data_inicio_importacao: reference.clone(),
            data_fim_importacao: reference,
            acerta_natureza: "ConsiderandoJornada",
            terminal_coleta: request.terminal_code.to_string(),
            file_path: request.file_path.clone(),
            natureza_fixa: "Saida",
            tipo_importacao: "Arquivo",
            tempo_minimo_entre_batidas: "00:00",
            quebra_secao: SECTION_BREAK_MASK,
            selecao: Selection {
                cod_recebimento: RECEIPT_CODES,
                cod_situacao: SITUATION_CODES,
                cod_tipo: TYPE_CODES,
                contexto: Context {
                    params: format!(
                        "$CODCOLIGADA={};$CODUSUARIO={};$DATASISTEMA={}",
                        request.company_code,
                        ERP_PROCESS_USER,
                        erp_datetime(Utc::now().date_naive())
                    ),
                },
            },
        }
    }
}

/// ERP timestamps are day precision pinned to midnight.
fn erp_datetime(date: NaiveDate) -> String {
    format!("{}T00:00:00", date.format("%Y-%m-%d"))
}

fn map_http_error(err: reqwest::Error) -> PunchSyncError {
    PunchSyncError::from(InfraError::from(err))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_client(server: &MockServer) -> ErpProcessClient {
        let config = ErpConfig {
            base_url: server.uri(),
            username: "erp-user".into(),
            password: "erp-secret".into(),
            import_path: "Z:/import/".into(),
            settle_secs: 0,
        };
        let http = HttpClient::builder().max_attempts(1).build().expect("http client");
        ErpProcessClient::new(&config, http)
    }

    fn import_request() -> ImportProcessRequest {
        ImportProcessRequest {
            company_code: 1,
            terminal_code: 9006,
            file_path: "Z:/import/01-03-2024 Dock 6.txt".into(),
            reference_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn posts_the_canonical_descriptor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/restprocess/executeprocess/PtoProcImportacaoBatidas"))
            .and(basic_auth("erp-user", "erp-secret"))
            .and(body_partial_json(json!({
                "ActionModule": "A",
                "ActionName": "PtoActionProcImportacaoBatidas",
                "ProcessName": "Importação de Batidas",
                "ServerName": "PtoProcImportacaoBatidas",
                "CodUsuario": "PortalMatriculaInt",
                "CodColigada": 1,
                "CodigoLayoutRelogio": "001",
                "DataInicioImportacao": "2024-03-01T00:00:00",
                "DataFimImportacao": "2024-03-01T00:00:00",
                "TerminalColeta": "9006",
                "FilePath": "Z:/import/01-03-2024 Dock 6.txt",
                "TipoImportacao": "Arquivo",
                "QuebraSecao": "???????????????",
                "Selecao": {
                    "CodRecebimento": "DHMOPQST",
                    "CodSituacao": "ADEFILMOPRSTUVWZ",
                    "CodTipo": "ABCDEFIMNOPRSUXZ"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("\"1\""))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let body = client.execute_import(&import_request()).await.expect("call succeeds");
        assert_eq!(body, "\"1\"");
    }

    #[tokio::test]
    async fn context_params_carry_company_and_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        client.execute_import(&import_request()).await.expect("call succeeds");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let params = body["Selecao"]["Contexto"]["_params"].as_str().unwrap();
        assert!(params.starts_with("$CODCOLIGADA=1;$CODUSUARIO=PortalMatriculaInt;$DATASISTEMA="));
    }

    #[tokio::test]
    async fn server_rejection_maps_to_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = client.execute_import(&import_request()).await;
        assert!(matches!(result, Err(PunchSyncError::Network(_))));
    }
}
