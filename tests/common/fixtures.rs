//! Distribution response fixtures and payload generators

use distdfe::DocumentDecoder;

/// Summary document as the authority sends it for a new invoice
pub const RES_NFE: &str = r#"<resNFe xmlns="http://www.portalfiscal.inf.br/nfe" versao="1.01"><chNFe>35240512345678000195550010000000011000000010</chNFe><CNPJ>98765432000198</CNPJ><xNome>FORNECEDOR TESTE LTDA</xNome><vNF>150.00</vNF><cSitNFe>1</cSitNFe></resNFe>"#;

/// Event summary document
pub const RES_EVENTO: &str = r#"<resEvento xmlns="http://www.portalfiscal.inf.br/nfe" versao="1.01"><chNFe>35240512345678000195550010000000011000000010</chNFe><tpEvento>110111</tpEvento><xEvento>Cancelamento</xEvento></resEvento>"#;

/// One `docZip` element carrying `content`, encoded the way the authority does
pub fn doc_zip(nsu: &str, schema: &str, content: &str) -> String {
    let payload = DocumentDecoder::encode(content.as_bytes()).unwrap_or_default();
    format!(
        r#"<docZip NSU="{}" schema="{}">{}</docZip>"#,
        nsu, schema, payload
    )
}

/// A `docZip` element with a payload that is not valid Base64
pub fn corrupt_doc_zip(nsu: &str, schema: &str) -> String {
    format!(
        r#"<docZip NSU="{}" schema="{}">@@not-base64@@</docZip>"#,
        nsu, schema
    )
}

/// Full SOAP response with the given status, cursors and packages
pub fn distribution_response(
    status: &str,
    reason: &str,
    ult_nsu: Option<&str>,
    max_nsu: Option<&str>,
    packages: &[String],
) -> String {
    let mut ret = format!(
        "<tpAmb>1</tpAmb><verAplic>1.7.6</verAplic><cStat>{}</cStat><xMotivo>{}</xMotivo><dhResp>2024-05-10T10:15:00-03:00</dhResp>",
        status, reason
    );
    if let Some(ult) = ult_nsu {
        ret.push_str(&format!("<ultNSU>{}</ultNSU>", ult));
    }
    if let Some(max) = max_nsu {
        ret.push_str(&format!("<maxNSU>{}</maxNSU>", max));
    }
    if !packages.is_empty() {
        ret.push_str("<loteDistDFeInt>");
        for package in packages {
            ret.push_str(package);
        }
        ret.push_str("</loteDistDFeInt>");
    }

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">"#,
            r#"<soap:Body><nfeDistDFeInteresseResponse xmlns="http://www.portalfiscal.inf.br/nfe/wsdl/NFeDistribuicaoDFe">"#,
            r#"<nfeDistDFeInteresseResult><retDistDFeInt xmlns="http://www.portalfiscal.inf.br/nfe" versao="1.01">{}</retDistDFeInt></nfeDistDFeInteresseResult>"#,
            r#"</nfeDistDFeInteresseResponse></soap:Body></soap:Envelope>"#
        ),
        ret
    )
}

/// "Documents located" response carrying packages
pub fn documents_response(ult_nsu: &str, max_nsu: &str, packages: &[String]) -> String {
    distribution_response(
        "138",
        "Documento(s) localizado(s)",
        Some(ult_nsu),
        Some(max_nsu),
        packages,
    )
}

/// "No documents" response; the authority still reports the cursor
pub fn no_documents_response(ult_nsu: &str) -> String {
    distribution_response(
        "137",
        "Nenhum documento localizado",
        Some(ult_nsu),
        Some(ult_nsu),
        &[],
    )
}

/// Rejection without any cursor
pub fn rejection_response() -> String {
    distribution_response("656", "Rejeicao: Consumo Indevido", None, None, &[])
}
