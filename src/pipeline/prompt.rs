use serde_json::Value;

/// Build the billing-code classification prompt for one requisition.
///
/// The flattened report and the billed procedures are interpolated as-is.
/// The rules are instructions for the model; nothing here evaluates them.
pub fn build_billing_prompt(report_text: &str, billed: &[Value]) -> String {
    let billed_json =
        serde_json::to_string_pretty(billed).unwrap_or_else(|_| Value::from(billed).to_string());

    format!(
        r#"Analise o seguinte laudo de patologia e os procedimentos cobrados pela API. Gere uma tabela Markdown com as colunas 'CodRequisicao', 'Código', 'Quantidade', seguindo as regras abaixo. Responda com a tabela Markdown, e com justificativas curtas.

Regras de Classificação e Contagem:
1.  Peça Principal: Classifique cada 'Diagnóstico' principal com base no 'LaudoMicro' e 'LaudoMacro'.Pode haver mais de uma peça principal.
    * 40601110 (Biópsia Simples): Amostra única ou até 2/frasco, < 1 cm, sem menção de margens no LaudoMicro.
    * 40601196 (Biópsia Múltiplos Fragmentos): 4+ fragmentos/frasco, < 1 cm, sem menção de margens no LaudoMicro.
    * 40601200 (Peça Cirúrgica Simples): Peças pequenas (< 3 cm, exceto mama), cistos, pólipos, pele (se principal). Até 3 margens (código 40601226) podem estar associadas.
    * 40601218 (Peça Cirúrgica Complexa): Peças médias/grandes (> 7 cm), mastectomia, gastrectomia. Até 5 margens (código 40601226) podem estar associadas.
    * Se LaudoMicro descrever "corpo e antro", classifique como dois procedimentos separados (provavelmente 40601110 ou 40601196, dependendo dos fragmentos).
2.  Peças Adicionais (40601226):
    * Margens: Se 'LaudoMicro' mencionar "margem" ou "margens" a peça principal será 40601200 ou 40601218:
        * "Margens" (plural): Conte 2x 40601226 (ou o número exato se especificado).
        * "Margem" (singular): Conte 1x 40601226.
        * Margens comprometidas, elas NÃO contam para este código.
    * Linfonodos: Contar cada linfonodo como 1x 40601226 (máximo 6 por grupo, se aplicável).
    * Lobo esquerdo ou direito
    * Dutos
3.  Colorações Especiais (40601269): Conte 1x 40601269 para cada nome de coloração listado na seção 'Coloração:' que NÃO seja 'HE' . Nomes válidos: Alcian Blue, Azul de Toluidina, Fontana-Masson, Giemsa, Gram, Grocott, Tricômio de Masson, Verheoff, Vermelho Congo.
4.  Citopatologia (se aplicável, baseado na descrição geral, não detalhado no exemplo):
    * 40601129 (Citopatológico Oncótico de Líquidos/Raspados)
    * 40601137 (Citopatologia Cervicovaginal)
5.  CodRequisicao: Use o código da requisição fornecido no texto.

Texto do Laudo:
{report_text}

Procedimentos Cobrados pela API (apenas para referência, não use para a sua tabela):
{billed_json}

Tabela Markdown de Saída (exemplo):
| CodRequisicao | Código | Quantidade |
| :--- | :--- | :--- |
| 12345 | 40601110 | 1 |
"#
    )
}
